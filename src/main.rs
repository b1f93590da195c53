//! taskwright CLI binary.
//!
//! This is the minimal entrypoint. All logic is in the library; `main`
//! only builds a runtime, invokes `taskwright::run`, and maps the result
//! to a process exit code.

fn main() {
    let code = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .expect("failed to start tokio runtime")
        .block_on(taskwright::run(std::env::args()));
    std::process::exit(code);
}
