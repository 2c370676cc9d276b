// FFI type definitions and the buffer-sizing protocol (§4.4): every entry
// point that returns binary data writes into a caller-owned buffer and
// reports back how many bytes were used (or would be needed).

use std::os::raw::c_char;

/// `0` success, `-2` buffer too small, negative otherwise (§6.1).
pub type ReturnCode = i32;

pub const RC_OK: ReturnCode = 0;
pub const RC_BUFFER_TOO_SMALL: ReturnCode = -2;

/// `0` means failure — the caller consults the structured error store.
pub type HandleId = u32;

/// Copies `data` into `(out_buf, out_len)`, writing the true length to
/// `*out_written` either way. Returns `RC_BUFFER_TOO_SMALL` without
/// touching `out_buf` when it doesn't fit, so a caller can always retry
/// with a buffer sized to the reported `*out_written`.
///
/// # Safety
/// `out_buf` must be valid for `out_len` bytes and `out_written` for one
/// `u32` write; both are standard FFI out-parameter requirements the
/// caller must uphold.
pub unsafe fn write_out_buffer(data: &[u8], out_buf: *mut u8, out_len: u32, out_written: *mut u32) -> ReturnCode {
    if !out_written.is_null() {
        *out_written = data.len() as u32;
    }
    if data.len() > out_len as usize {
        return RC_BUFFER_TOO_SMALL;
    }
    if !out_buf.is_null() && !data.is_empty() {
        std::ptr::copy_nonoverlapping(data.as_ptr(), out_buf, data.len());
    }
    RC_OK
}

/// # Safety
/// `ptr` must be null or a valid null-terminated C string for the
/// duration of this call.
pub unsafe fn c_str_to_string(ptr: *const c_char) -> Option<String> {
    if ptr.is_null() {
        return None;
    }
    std::ffi::CStr::from_ptr(ptr).to_str().ok().map(str::to_owned)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reports_required_size_when_buffer_too_small() {
        let data = vec![1u8, 2, 3, 4];
        let mut written = 0u32;
        let mut small = [0u8; 2];
        let rc = unsafe { write_out_buffer(&data, small.as_mut_ptr(), small.len() as u32, &mut written) };
        assert_eq!(rc, RC_BUFFER_TOO_SMALL);
        assert_eq!(written, 4);
    }

    #[test]
    fn copies_data_when_buffer_is_large_enough() {
        let data = vec![1u8, 2, 3, 4];
        let mut written = 0u32;
        let mut buf = [0u8; 8];
        let rc = unsafe { write_out_buffer(&data, buf.as_mut_ptr(), buf.len() as u32, &mut written) };
        assert_eq!(rc, RC_OK);
        assert_eq!(written, 4);
        assert_eq!(&buf[..4], &data[..]);
    }

    #[test]
    fn empty_data_succeeds_with_zero_written() {
        let mut written = 0u32;
        let rc = unsafe { write_out_buffer(&[], std::ptr::null_mut(), 0, &mut written) };
        assert_eq!(rc, RC_OK);
        assert_eq!(written, 0);
    }
}
