use std::io;
use std::ptr;

use crate::error::EmitError;

/// Default code buffer size: 1 MiB (doubles on demand).
const DEFAULT_CODE_BUF_SIZE: usize = 1024 * 1024;

/// A branch/address target inside the buffer.
///
/// Labels start unbound; binding records the cursor. Sites that
/// reference a label before it is bound leave a pending patch which
/// [`CodeBuffer::finalize`] resolves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Label(pub(crate) u32);

impl Label {
    pub fn id(self) -> u32 {
        self.0
    }
}

/// Deferred write-back to an already-emitted site.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatchKind {
    /// 4-byte displacement of a `call rel32`.
    Rel32Call,
    /// 4-byte displacement of a `jmp`/`jcc rel32`.
    Rel32Jump,
    /// 1-byte displacement of a short jump.
    Rel8Jump,
    /// 8-byte absolute address (immediate of `mov reg, imm64`),
    /// resolved against the buffer's final base address.
    Abs64MovImm,
}

impl PatchKind {
    const fn width(self) -> usize {
        match self {
            PatchKind::Rel32Call | PatchKind::Rel32Jump => 4,
            PatchKind::Rel8Jump => 1,
            PatchKind::Abs64MovImm => 8,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Patch {
    site: usize,
    kind: PatchKind,
    target: Label,
}

/// Growable JIT code buffer backed by mmap'd memory.
///
/// W^X discipline: writable while emitting, executable only after
/// finalization. Growth may move the mapping, so positions are only ever
/// exposed as integer offsets; nothing outside this module holds a
/// pointer into the buffer until [`finalize`](Self::finalize) pins it.
pub struct CodeBuffer {
    ptr: *mut u8,
    size: usize,
    offset: usize,
    labels: Vec<Option<usize>>,
    patches: Vec<Patch>,
}

// SAFETY: CodeBuffer owns its mmap'd memory exclusively.
unsafe impl Send for CodeBuffer {}

impl CodeBuffer {
    /// Allocate a buffer of the given size (rounded up to page size).
    pub fn new(size: usize) -> io::Result<Self> {
        let page = page_size();
        let size = (size.max(page) + page - 1) & !(page - 1);
        // SAFETY: anonymous private mapping, no file backing.
        let ptr = unsafe {
            libc::mmap(
                ptr::null_mut(),
                size,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_PRIVATE | libc::MAP_ANONYMOUS,
                -1,
                0,
            )
        };
        if ptr == libc::MAP_FAILED {
            return Err(io::Error::last_os_error());
        }
        Ok(Self {
            ptr: ptr as *mut u8,
            size,
            offset: 0,
            labels: Vec::new(),
            patches: Vec::new(),
        })
    }

    pub fn with_default_size() -> io::Result<Self> {
        Self::new(DEFAULT_CODE_BUF_SIZE)
    }

    /// Current write cursor. Monotonic; equals the final byte length
    /// after the last emission.
    #[inline]
    pub fn pos(&self) -> usize {
        self.offset
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.size
    }

    /// Double the mapping until `extra` more bytes fit. The mapping may
    /// move; offsets stay valid, raw pointers would not.
    fn ensure(&mut self, extra: usize) {
        if self.offset + extra <= self.size {
            return;
        }
        let mut new_size = self.size * 2;
        while self.offset + extra > new_size {
            new_size *= 2;
        }
        // SAFETY: remapping our own anonymous mapping; MREMAP_MAYMOVE
        // keeps the old contents.
        let p = unsafe {
            libc::mremap(
                self.ptr as *mut libc::c_void,
                self.size,
                new_size,
                libc::MREMAP_MAYMOVE,
            )
        };
        assert!(
            p != libc::MAP_FAILED,
            "code buffer growth failed: {}",
            io::Error::last_os_error()
        );
        self.ptr = p as *mut u8;
        self.size = new_size;
    }

    // -- Emit methods (little-endian appends) --

    #[inline]
    pub fn emit_u8(&mut self, val: u8) {
        self.ensure(1);
        // SAFETY: ensure() guarantees room at offset.
        unsafe { self.ptr.add(self.offset).write(val) };
        self.offset += 1;
    }

    #[inline]
    pub fn emit_u16(&mut self, val: u16) {
        self.ensure(2);
        unsafe { (self.ptr.add(self.offset) as *mut u16).write_unaligned(val) };
        self.offset += 2;
    }

    #[inline]
    pub fn emit_u32(&mut self, val: u32) {
        self.ensure(4);
        unsafe { (self.ptr.add(self.offset) as *mut u32).write_unaligned(val) };
        self.offset += 4;
    }

    #[inline]
    pub fn emit_u64(&mut self, val: u64) {
        self.ensure(8);
        unsafe { (self.ptr.add(self.offset) as *mut u64).write_unaligned(val) };
        self.offset += 8;
    }

    pub fn emit_bytes(&mut self, data: &[u8]) {
        self.ensure(data.len());
        // SAFETY: ensure() guarantees room; regions cannot overlap.
        unsafe {
            ptr::copy_nonoverlapping(
                data.as_ptr(),
                self.ptr.add(self.offset),
                data.len(),
            );
        }
        self.offset += data.len();
    }

    // -- Patching of already-emitted bytes --

    /// Rewrite `width` (1, 4 or 8) bytes at `offset`.
    pub fn patch_at(&mut self, offset: usize, width: usize, val: u64) {
        assert!(offset + width <= self.offset, "patch past cursor");
        // SAFETY: range checked against the written region.
        unsafe {
            match width {
                1 => self.ptr.add(offset).write(val as u8),
                4 => (self.ptr.add(offset) as *mut u32)
                    .write_unaligned(val as u32),
                8 => (self.ptr.add(offset) as *mut u64).write_unaligned(val),
                _ => panic!("unsupported patch width {width}"),
            }
        }
    }

    pub fn read_u32(&self, offset: usize) -> u32 {
        assert!(offset + 4 <= self.offset);
        unsafe { (self.ptr.add(offset) as *const u32).read_unaligned() }
    }

    // -- Labels and pending patches --

    /// Create a fresh, unbound label.
    pub fn mark_label(&mut self) -> Label {
        let id = self.labels.len() as u32;
        self.labels.push(None);
        Label(id)
    }

    /// Bind a label to the current cursor.
    pub fn bind_label(&mut self, label: Label) -> Result<(), EmitError> {
        let slot = &mut self.labels[label.0 as usize];
        if slot.is_some() {
            return Err(EmitError::LabelRebound(label.0));
        }
        *slot = Some(self.offset);
        Ok(())
    }

    /// Bind a label to an explicit offset (entry points recorded after
    /// the fact).
    pub fn bind_label_at(
        &mut self,
        label: Label,
        offset: usize,
    ) -> Result<(), EmitError> {
        let slot = &mut self.labels[label.0 as usize];
        if slot.is_some() {
            return Err(EmitError::LabelRebound(label.0));
        }
        *slot = Some(offset);
        Ok(())
    }

    pub fn label_offset(&self, label: Label) -> Option<usize> {
        self.labels[label.0 as usize]
    }

    /// Record a pending patch at `site` (the offset of the displacement
    /// or immediate field, not of the opcode).
    pub fn add_patch(&mut self, site: usize, kind: PatchKind, target: Label) {
        self.patches.push(Patch { site, kind, target });
    }

    pub fn pending_patches(&self) -> usize {
        self.patches.len()
    }

    /// Resolve every pending patch, seal the mapping RX, and hand off
    /// the bytes. Relative displacements are
    /// `target - (site + width)`; absolute patches get base + target.
    pub fn finalize(mut self) -> Result<FinalizedCode, EmitError> {
        let base = self.ptr as u64;
        let patches = std::mem::take(&mut self.patches);
        for Patch { site, kind, target } in patches {
            let target_offset = self
                .label_offset(target)
                .ok_or(EmitError::UnresolvedPatch {
                    site,
                    label: target.0,
                })?;
            match kind {
                PatchKind::Rel32Call | PatchKind::Rel32Jump => {
                    let disp =
                        target_offset as i64 - (site as i64 + 4);
                    if disp < i32::MIN as i64 || disp > i32::MAX as i64 {
                        return Err(EmitError::PatchRange { site });
                    }
                    self.patch_at(site, 4, disp as u32 as u64);
                }
                PatchKind::Rel8Jump => {
                    let disp = target_offset as i64 - (site as i64 + 1);
                    if disp < i8::MIN as i64 || disp > i8::MAX as i64 {
                        return Err(EmitError::PatchRange { site });
                    }
                    self.patch_at(site, 1, disp as u8 as u64);
                }
                PatchKind::Abs64MovImm => {
                    self.patch_at(site, 8, base + target_offset as u64);
                }
            }
        }
        // SAFETY: flipping our own mapping to read+exec.
        let ret = unsafe {
            libc::mprotect(
                self.ptr as *mut libc::c_void,
                self.size,
                libc::PROT_READ | libc::PROT_EXEC,
            )
        };
        if ret != 0 {
            return Err(EmitError::Capacity(io::Error::last_os_error()));
        }

        let code = FinalizedCode {
            ptr: self.ptr,
            size: self.size,
            len: self.offset,
        };
        // Ownership of the mapping moved into FinalizedCode; drop the
        // label storage, then suppress the munmap in Drop.
        self.labels = Vec::new();
        std::mem::forget(self);
        Ok(code)
    }

    /// The written bytes, for inspection while still emitting.
    pub fn as_slice(&self) -> &[u8] {
        // SAFETY: ptr..ptr+offset has been written.
        unsafe { std::slice::from_raw_parts(self.ptr, self.offset) }
    }
}

impl Drop for CodeBuffer {
    fn drop(&mut self) {
        if !self.ptr.is_null() {
            unsafe {
                libc::munmap(self.ptr as *mut libc::c_void, self.size);
            }
        }
    }
}

/// A finalized, executable code region. The address is pinned for the
/// lifetime of this value; `abs64-mov-imm` patches were resolved against
/// it.
pub struct FinalizedCode {
    ptr: *mut u8,
    size: usize,
    len: usize,
}

unsafe impl Send for FinalizedCode {}

impl FinalizedCode {
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn base_addr(&self) -> u64 {
        self.ptr as u64
    }

    pub fn as_slice(&self) -> &[u8] {
        // SAFETY: ptr..ptr+len was written before finalization.
        unsafe { std::slice::from_raw_parts(self.ptr, self.len) }
    }

    /// Copy out the raw bytes.
    pub fn to_bytes(&self) -> Vec<u8> {
        self.as_slice().to_vec()
    }

    /// Entry point at `offset`.
    ///
    /// # Safety
    /// The code at `offset` must follow the `extern "sysv64"` no-arg
    /// convention (programs emitted by this crate do). Exit-style
    /// programs never return; call them only in a forked child.
    pub unsafe fn entry_at(&self, offset: usize) -> extern "sysv64" fn() -> u64 {
        debug_assert!(offset < self.len);
        std::mem::transmute(self.ptr.add(offset))
    }
}

impl Drop for FinalizedCode {
    fn drop(&mut self) {
        if !self.ptr.is_null() {
            unsafe {
                libc::munmap(self.ptr as *mut libc::c_void, self.size);
            }
        }
    }
}

fn page_size() -> usize {
    // SAFETY: sysconf is always safe to call.
    unsafe { libc::sysconf(libc::_SC_PAGESIZE) as usize }
}
