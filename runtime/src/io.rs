//! Print helpers called from emitted code.
//!
//! Numeric prints render decimal plus a trailing newline; the descriptor
//! comes from runtime state so tests can swing it onto a pipe. String
//! literals are not printed here; the emitter inlines those with a
//! direct `sys_write` sequence.

use crate::state::RuntimeState;

fn write_all(fd: i32, mut buf: &[u8]) {
    while !buf.is_empty() {
        // SAFETY: buf is a live slice; write does not retain the pointer.
        let n = unsafe {
            libc::write(fd, buf.as_ptr() as *const libc::c_void, buf.len())
        };
        if n <= 0 {
            return;
        }
        buf = &buf[n as usize..];
    }
}

impl RuntimeState {
    pub fn print_i64(&self, value: i64) {
        let mut buf = [0u8; 24];
        let mut pos = buf.len();
        buf[pos - 1] = b'\n';
        pos -= 1;

        let negative = value < 0;
        let mut mag = value.unsigned_abs();
        loop {
            pos -= 1;
            buf[pos] = b'0' + (mag % 10) as u8;
            mag /= 10;
            if mag == 0 {
                break;
            }
        }
        if negative {
            pos -= 1;
            buf[pos] = b'-';
        }
        write_all(self.out_fd(), &buf[pos..]);
    }

    pub fn print_f64(&self, value: f64) {
        let s = format!("{value}\n");
        write_all(self.out_fd(), s.as_bytes());
    }
}
