//! Shared test plumbing: one runtime per test binary, and a fork-based
//! executor for emitted programs.

use std::io::Read;
use std::os::fd::FromRawFd;
use std::sync::Mutex;

use blaze_ast::Ast;
use blaze_backend::emit::emit_program;
use blaze_runtime::{CalibratedClock, RuntimeConfig, RuntimeState};

/// The per-process runtime, installed on first use.
///
/// Tests use the calibrated (monotonic) clock so rate-flow assertions
/// measure real time instead of an assumed TSC frequency.
pub fn rt() -> &'static RuntimeState {
    RuntimeState::install(RuntimeConfig {
        clock: Box::new(CalibratedClock::new()),
        ..RuntimeConfig::default()
    })
    .expect("runtime install")
}

// Forks share pipe descriptors and the child's stdout; one at a time.
static EXEC_LOCK: Mutex<()> = Mutex::new(());

/// Compile `ast`, run it in a forked child with stdout on a pipe, and
/// return (stdout, exit status).
pub fn run_program(ast: &Ast) -> (String, i32) {
    let _guard = EXEC_LOCK.lock().unwrap();
    let state = rt();
    let code = emit_program(ast, state.layout()).expect("emission");

    let mut fds = [0i32; 2];
    assert_eq!(unsafe { libc::pipe(fds.as_mut_ptr()) }, 0, "pipe");
    let (rd, wr) = (fds[0], fds[1]);

    // SAFETY: the child only runs emitted code and exits through
    // sys_exit; the parent reaps it with waitpid.
    let pid = unsafe { libc::fork() };
    assert!(pid >= 0, "fork failed");

    if pid == 0 {
        unsafe {
            libc::close(rd);
            libc::dup2(wr, 1);
            libc::close(wr);
            let entry = code.entry_at(0);
            entry();
            // The program ends in sys_exit; getting here means it fell
            // through, which is itself a failure.
            libc::_exit(127);
        }
    }

    unsafe { libc::close(wr) };
    let mut out = String::new();
    let mut reader = unsafe { std::fs::File::from_raw_fd(rd) };
    reader.read_to_string(&mut out).expect("read child stdout");

    let mut status = 0i32;
    let r = unsafe { libc::waitpid(pid, &mut status, 0) };
    assert_eq!(r, pid, "waitpid");
    assert!(libc::WIFEXITED(status), "child did not exit normally");
    (out, libc::WEXITSTATUS(status))
}
