//! Scoped access to the codec's linear memory.
//!
//! Every sandbox allocation goes through [`with_buffer`] (or [`adopt`] for a
//! pointer the codec allocated itself), which releases it exactly once when
//! the body finishes, whether it returns or unwinds.  Reads and writes are
//! range checked against the buffer before they reach the guest.

use crate::error::{CodecError, Result};
use crate::guest::Guest;

/// A region of sandbox linear memory owned by the current call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinearBuffer {
    ptr: u32,
    len: usize,
}

impl LinearBuffer {
    pub fn ptr(&self) -> u32 {
        self.ptr
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// The same region with a length learned after the fact (e.g. the size
    /// the codec reported for a buffer it allocated).
    pub fn assume_len(self, len: usize) -> Self {
        Self { len, ..self }
    }

    /// Sandbox address `offset` bytes into the buffer.
    pub fn at(&self, offset: u32) -> u32 {
        self.ptr.wrapping_add(offset)
    }
}

/// Allocate `size` bytes in the sandbox, run `body`, then free the buffer.
///
/// The buffer is freed on every path out of `body`, including a panic.  If
/// `body` fails and the release fails too, the body's error is returned and
/// the release failure is logged.  Sizes the `i32` ABI cannot carry are
/// rejected before the guest is called.
pub fn with_buffer<G, T, F>(guest: &mut G, step: &'static str, size: usize, body: F) -> Result<T>
where
    G: Guest + ?Sized,
    F: FnOnce(&mut G, LinearBuffer) -> Result<T>,
{
    let alloc_size = i32::try_from(size)
        .map(|n| n as u32)
        .map_err(|_| CodecError::AllocFailed { step, size })?;
    let ptr = guest.alloc(alloc_size)?;
    if ptr == 0 {
        return Err(CodecError::AllocFailed { step, size });
    }
    tracing::trace!(step, ptr, size, "sandbox buffer allocated");

    let mut lease = Lease::new(guest, step, ptr);
    let result = body(&mut *lease.guest, LinearBuffer { ptr, len: size });
    lease.finish(result)
}

/// Take ownership of a codec-allocated pointer for the duration of `body`.
///
/// The buffer starts out empty; use [`LinearBuffer::assume_len`] once its
/// size is known.  A null pointer is passed through and never freed.
pub fn adopt<G, T, F>(guest: &mut G, step: &'static str, ptr: u32, body: F) -> Result<T>
where
    G: Guest + ?Sized,
    F: FnOnce(&mut G, LinearBuffer) -> Result<T>,
{
    if ptr == 0 {
        return body(guest, LinearBuffer { ptr, len: 0 });
    }
    let mut lease = Lease::new(guest, step, ptr);
    let result = body(&mut *lease.guest, LinearBuffer { ptr, len: 0 });
    lease.finish(result)
}

/// A live sandbox allocation.  Freed by [`Lease::finish`] on the normal
/// path, or by `Drop` if the body unwinds.
struct Lease<'g, G: Guest + ?Sized> {
    guest: &'g mut G,
    step: &'static str,
    ptr: u32,
    armed: bool,
}

impl<'g, G: Guest + ?Sized> Lease<'g, G> {
    fn new(guest: &'g mut G, step: &'static str, ptr: u32) -> Self {
        Self {
            guest,
            step,
            ptr,
            armed: true,
        }
    }

    fn finish<T>(mut self, result: Result<T>) -> Result<T> {
        self.armed = false;
        release(&mut *self.guest, self.step, self.ptr, result)
    }
}

impl<G: Guest + ?Sized> Drop for Lease<'_, G> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        match self.guest.free(self.ptr) {
            Ok(()) => tracing::debug!(step = self.step, ptr = self.ptr, "sandbox buffer released during unwind"),
            Err(err) => tracing::warn!(
                step = self.step,
                ptr = self.ptr,
                error = %err,
                "failed to release sandbox buffer during unwind"
            ),
        }
    }
}

fn release<G, T>(guest: &mut G, step: &'static str, ptr: u32, result: Result<T>) -> Result<T>
where
    G: Guest + ?Sized,
{
    let freed = guest.free(ptr);
    tracing::trace!(step, ptr, "sandbox buffer released");
    match (result, freed) {
        (Ok(value), Ok(())) => Ok(value),
        (Ok(_), Err(free_err)) => Err(free_err),
        (Err(err), Ok(())) => Err(err),
        (Err(err), Err(free_err)) => {
            tracing::warn!(step, ptr, error = %free_err, "failed to release sandbox buffer");
            Err(err)
        }
    }
}

/// Copy `bytes` to the start of `buf`.
pub fn write<G: Guest + ?Sized>(
    guest: &mut G,
    step: &'static str,
    buf: LinearBuffer,
    bytes: &[u8],
) -> Result<()> {
    write_at(guest, step, buf, 0, bytes)
}

/// Copy `bytes` into `buf` at `offset`.
pub fn write_at<G: Guest + ?Sized>(
    guest: &mut G,
    step: &'static str,
    buf: LinearBuffer,
    offset: usize,
    bytes: &[u8],
) -> Result<()> {
    let ptr = buf.at(offset as u32);
    let in_bounds = offset
        .checked_add(bytes.len())
        .is_some_and(|end| end <= buf.len);
    if !in_bounds || !guest.write(ptr, bytes) {
        return Err(CodecError::MemWrite {
            step,
            ptr,
            len: bytes.len(),
        });
    }
    Ok(())
}

/// Copy `len` bytes out of the sandbox starting at `buf`.
pub fn read<G: Guest + ?Sized>(
    guest: &mut G,
    step: &'static str,
    buf: LinearBuffer,
    len: usize,
) -> Result<Vec<u8>> {
    read_at(guest, step, buf, 0, len)
}

fn read_at<G: Guest + ?Sized>(
    guest: &mut G,
    step: &'static str,
    buf: LinearBuffer,
    offset: usize,
    len: usize,
) -> Result<Vec<u8>> {
    let ptr = buf.at(offset as u32);
    let err = || CodecError::MemRead { step, ptr, len };
    let in_bounds = offset.checked_add(len).is_some_and(|end| end <= buf.len);
    if !in_bounds {
        return Err(err());
    }
    let wire_len = u32::try_from(len).map_err(|_| err())?;
    match guest.read(ptr, wire_len) {
        Some(bytes) if bytes.len() == len => Ok(bytes),
        _ => Err(err()),
    }
}

/// Little-endian `u32` at `offset` within `buf`.
pub fn read_u32_le<G: Guest + ?Sized>(
    guest: &mut G,
    step: &'static str,
    buf: LinearBuffer,
    offset: usize,
) -> Result<u32> {
    let bytes = read_at(guest, step, buf, offset, 4)?;
    let mut raw = [0u8; 4];
    raw.copy_from_slice(&bytes);
    Ok(u32::from_le_bytes(raw))
}

/// Little-endian `u64` at `offset` within `buf`.
pub fn read_u64_le<G: Guest + ?Sized>(
    guest: &mut G,
    step: &'static str,
    buf: LinearBuffer,
    offset: usize,
) -> Result<u64> {
    let bytes = read_at(guest, step, buf, offset, 8)?;
    let mut raw = [0u8; 8];
    raw.copy_from_slice(&bytes);
    Ok(u64::from_le_bytes(raw))
}
