// loxvm: a bytecode virtual machine for a small dynamically-typed
// scripting language.
//
// This program is free software: you can redistribute it and/or
// modify it under the terms of the GNU Lesser General Public License
// as published by the Free Software Foundation, either version 3 of
// the License, or (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the GNU
// Lesser General Public License for more details.
//
// You should have received a copy of the GNU Lesser General Public
// License along with this program.  If not, see
// <https://www.gnu.org/licenses/>.

//! VM tuning knobs (component C11), loadable from a `ron` document the
//! same way the original config module loaded dashboard layouts.

use serde::Deserialize;

/// Limits on the call-frame stack and the operand stack. These are
/// fixed at VM construction time; nothing in the dispatch loop
/// resizes them.
#[derive(Deserialize, Debug, Copy, Clone)]
pub struct VmConfig {
    /// Maximum live call frames before a stack-overflow runtime error.
    pub frames_max: usize,
    /// Maximum live operand-stack slots.
    pub stack_max: usize,
}

const FRAMES_MAX: usize = 64;

impl Default for VmConfig {
    fn default() -> Self {
        VmConfig {
            frames_max: FRAMES_MAX,
            stack_max: FRAMES_MAX * 256,
        }
    }
}

impl VmConfig {
    /// Parses a `ron`-encoded `VmConfig`, e.g.
    /// `(frames_max: 64, stack_max: 16384)`.
    pub fn from_ron(source: &str) -> Result<Self, String> {
        ron::de::from_str(source).map_err(|err| err.to_string())
    }

    /// Parses a JSON-encoded `VmConfig`, for embedders whose
    /// surrounding tooling already speaks JSON rather than `ron`.
    pub fn from_json(source: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(source)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_stack_max_is_frames_max_times_256() {
        let config = VmConfig::default();
        assert_eq!(config.stack_max, config.frames_max * 256);
    }

    #[test]
    fn parses_from_ron() {
        let config = VmConfig::from_ron("(frames_max: 32, stack_max: 4096)").unwrap();
        assert_eq!(config.frames_max, 32);
        assert_eq!(config.stack_max, 4096);
    }

    #[test]
    fn parses_from_json() {
        let config = VmConfig::from_json(r#"{"frames_max": 32, "stack_max": 4096}"#).unwrap();
        assert_eq!(config.frames_max, 32);
        assert_eq!(config.stack_max, 4096);
    }
}
