//! Interactive shell backing `-i`.
//!
//! A prompt/multiline/dot-command loop. Scanning and compiling quill
//! source text is an external, out-of-scope frontend, so each line this
//! REPL reads is the same precompiled-bytecode wire format `quill-rt`'s
//! `FilesystemLocator` loads `.qlc` caches from: a JSON-encoded
//! `quill_bytecode::Code`. A real frontend sitting in front of this
//! binary would compile the user's keystrokes to that format before
//! handing them here. One consequence of each line being its own
//! independently compiled `Code` is that top-level bindings don't persist
//! from one line to the next — there is no lower layer here to thread a
//! shared globals namespace through without inventing compiler behavior
//! this workspace doesn't own.

use std::io::{self, BufRead, Write};
use std::sync::Arc;

use quill_bytecode::Code;
use quill_rt::Runtime;

/// Run the interactive loop until `.exit`/EOF.
pub fn run(runtime: &Runtime, quiet: bool) {
    if !quiet {
        println!("Quill {} - type .help for help, .exit to exit\n", env!("CARGO_PKG_VERSION"));
    }

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    let mut multiline_buffer = String::new();
    let mut in_multiline = false;

    loop {
        print!("{}", if in_multiline { "...> " } else { "quill> " });
        let _ = stdout.flush();

        let mut line = String::new();
        match stdin.lock().read_line(&mut line) {
            Ok(0) => break,
            Ok(_) => {}
            Err(e) => {
                eprintln!("error reading input: {e}");
                break;
            }
        }
        let line = line.trim_end();

        if line.is_empty() && !in_multiline {
            continue;
        }

        if line.starts_with('.') && !in_multiline {
            match line {
                ".exit" | ".quit" | ".q" => break,
                ".help" | ".h" => {
                    print_help();
                    continue;
                }
                ".multiline" | ".m" => {
                    in_multiline = true;
                    println!("entering multiline mode. Type .end to execute, .cancel to abort.");
                    continue;
                }
                ".end" => {
                    if in_multiline {
                        let code = std::mem::take(&mut multiline_buffer);
                        in_multiline = false;
                        eval_line(runtime, &code);
                    }
                    continue;
                }
                ".cancel" => {
                    multiline_buffer.clear();
                    in_multiline = false;
                    println!("multiline input cancelled.");
                    continue;
                }
                _ => {
                    println!("unknown command: {line}. Type .help for available commands.");
                    continue;
                }
            }
        }

        if in_multiline {
            multiline_buffer.push_str(line);
            multiline_buffer.push('\n');
            continue;
        }

        eval_line(runtime, line);
    }

    println!("\ngoodbye!");
}

fn eval_line(runtime: &Runtime, text: &str) {
    let code: Code = match serde_json::from_str(text) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: not a valid compiled module: {e}");
            return;
        }
    };

    match runtime.run(Arc::new(code)) {
        Ok(value) => {
            if !matches!(value, quill_vm::Value::Nil) {
                println!("{}", quill_vm::format::repr_value(&value));
            }
        }
        Err(e) => eprintln!("error: {}", e.message()),
    }
}

fn print_help() {
    println!("REPL commands:");
    println!("  .help, .h      show this help message");
    println!("  .exit, .q      exit the REPL");
    println!("  .multiline, .m enter multiline mode");
    println!("  .end           execute multiline input");
    println!("  .cancel        cancel multiline input");
    println!();
    println!("each line is a JSON-encoded compiled module.");
}
