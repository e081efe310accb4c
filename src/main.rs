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

use std::env::args;
use std::fs;
use std::io::{self, Write};
use std::process::ExitCode;

use loxvm::config::VmConfig;
use loxvm::error::InterpretResult;
use loxvm::Vm;

/// Runtime errors print themselves (see `RuntimeError::emit`) as soon
/// as the VM raises them; compile errors are only ever collected, so
/// the two call sites below are what print them.
fn report_compile_errors(result: &InterpretResult) {
    if let InterpretResult::CompileError(errors) = result {
        for error in errors {
            eprintln!("{}", error);
        }
    }
}

/// Reads one line at a time from stdin and runs each as its own
/// compile/execute cycle, sharing one `Vm` (and so one set of globals)
/// across the whole session.
fn repl(vm: &mut Vm) {
    let mut line = String::new();
    loop {
        print!("> ");
        io::stdout().flush().ok();
        line.clear();
        match io::stdin().read_line(&mut line) {
            Ok(0) | Err(_) => break,
            Ok(_) => {
                let result = vm.interpret(&line);
                report_compile_errors(&result);
            }
        }
    }
}

fn run_file(vm: &mut Vm, path: &str) -> ExitCode {
    let source = match fs::read_to_string(path) {
        Ok(source) => source,
        Err(err) => {
            eprintln!("Could not read file \"{}\": {}", path, err);
            return ExitCode::from(74);
        }
    };
    let result = vm.interpret(&source);
    report_compile_errors(&result);
    let code = result.exit_code();
    ExitCode::from(code as u8)
}

/// Loads a `VmConfig` from `path`, trying `ron` first and falling back
/// to `json` for callers whose tooling produces that instead (mirrors
/// `VmConfig::from_ron`/`from_json`, the two formats `config.rs` can
/// parse).
fn load_config(path: &str) -> Result<VmConfig, ExitCode> {
    let text = fs::read_to_string(path).map_err(|err| {
        eprintln!("Could not read config \"{}\": {}", path, err);
        ExitCode::from(74)
    })?;
    VmConfig::from_ron(&text)
        .or_else(|_| VmConfig::from_json(&text).map_err(|err| err.to_string()))
        .map_err(|err| {
            eprintln!("Could not parse config \"{}\": {}", path, err);
            ExitCode::from(74)
        })
}

fn main() -> ExitCode {
    let config = match args().nth(2) {
        Some(path) => match load_config(&path) {
            Ok(config) => config,
            Err(code) => return code,
        },
        None => VmConfig::default(),
    };
    let mut vm = Vm::with_config(config);
    match args().nth(1) {
        None => {
            repl(&mut vm);
            ExitCode::SUCCESS
        }
        Some(path) => run_file(&mut vm, &path),
    }
}
