//! Demuxing from an in-memory byte buffer.
//!
//! FFmpeg normally pulls bytes through its own file/URL protocols. To decode
//! a container held in memory, [`MemoryInput`] installs a custom
//! `AVIOContext` whose read and seek callbacks walk a Rust-owned buffer, then
//! hands the resulting format context to `ffmpeg_next` as a regular
//! [`Input`].

use std::{
    ffi::{c_int, c_void},
    mem::ManuallyDrop,
    ops::{Deref, DerefMut},
    path::PathBuf,
    ptr,
};

use ffmpeg_next::format::context::Input;
use ffmpeg_sys_next::{AVFormatContext, AVIOContext};

use crate::error::VmafError;

/// Size of the scratch buffer FFmpeg reads through.
const AVIO_BUFFER_SIZE: usize = 64 * 1024;

const SEEK_SET: c_int = 0;
const SEEK_CUR: c_int = 1;
const SEEK_END: c_int = 2;

struct MemoryReader {
    data: Vec<u8>,
    position: usize,
}

unsafe extern "C" fn read_packet(opaque: *mut c_void, buffer: *mut u8, size: c_int) -> c_int {
    // SAFETY: `opaque` is the `MemoryReader` leaked in `MemoryInput::open`
    // and stays alive until `MemoryInput` is dropped.
    let reader = unsafe { &mut *(opaque as *mut MemoryReader) };
    let remaining = reader.data.len().saturating_sub(reader.position);
    if remaining == 0 || size <= 0 {
        return ffmpeg_sys_next::AVERROR_EOF;
    }

    let count = remaining.min(size as usize);
    // SAFETY: FFmpeg guarantees `buffer` holds at least `size` bytes.
    unsafe {
        ptr::copy_nonoverlapping(reader.data.as_ptr().add(reader.position), buffer, count);
    }
    reader.position += count;
    count as c_int
}

unsafe extern "C" fn seek(opaque: *mut c_void, offset: i64, whence: c_int) -> i64 {
    // SAFETY: see `read_packet`.
    let reader = unsafe { &mut *(opaque as *mut MemoryReader) };
    let length = reader.data.len() as i64;

    if whence & ffmpeg_sys_next::AVSEEK_SIZE as c_int != 0 {
        return length;
    }

    let base = match whence & !(ffmpeg_sys_next::AVSEEK_FORCE as c_int) {
        SEEK_SET => 0,
        SEEK_CUR => reader.position as i64,
        SEEK_END => length,
        _ => return -1,
    };
    let target = base + offset;
    if target < 0 || target > length {
        return -1;
    }
    reader.position = target as usize;
    target
}

/// A demuxer reading a container from memory.
///
/// Dereferences to [`Input`], so streams and packets are accessed exactly
/// as for a file-backed input.
pub(crate) struct MemoryInput {
    input: ManuallyDrop<Input>,
    avio: *mut AVIOContext,
    reader: *mut MemoryReader,
}

impl MemoryInput {
    /// Probe and open a container from `data`.
    pub(crate) fn open(data: Vec<u8>) -> Result<Self, VmafError> {
        let open_error = |reason: String| VmafError::FileOpen {
            path: PathBuf::from("<memory>"),
            reason,
        };

        if data.is_empty() {
            return Err(open_error("input buffer is empty".to_string()));
        }

        // SAFETY: raw FFmpeg C API. Ownership is tracked as follows:
        //   - `avio_buffer` belongs to the AVIO context once it is created
        //     (FFmpeg may reallocate it, so it is freed through `(*avio).buffer`);
        //   - `reader` is leaked into `opaque` and reclaimed in `Drop`;
        //   - on a failed `avformat_open_input` FFmpeg frees the format context
        //     itself, but never the custom AVIO context.
        unsafe {
            let reader = Box::into_raw(Box::new(MemoryReader { data, position: 0 }));

            let avio_buffer = ffmpeg_sys_next::av_malloc(AVIO_BUFFER_SIZE) as *mut u8;
            if avio_buffer.is_null() {
                drop(Box::from_raw(reader));
                return Err(VmafError::ResourceAllocation("AVIO read buffer".to_string()));
            }

            let mut avio = ffmpeg_sys_next::avio_alloc_context(
                avio_buffer,
                AVIO_BUFFER_SIZE as c_int,
                0,
                reader as *mut c_void,
                Some(read_packet),
                None,
                Some(seek),
            );
            if avio.is_null() {
                ffmpeg_sys_next::av_free(avio_buffer as *mut c_void);
                drop(Box::from_raw(reader));
                return Err(VmafError::ResourceAllocation("AVIO context".to_string()));
            }

            let release_io = |avio: &mut *mut AVIOContext| {
                if !(**avio).buffer.is_null() {
                    ffmpeg_sys_next::av_freep(&mut (**avio).buffer as *mut *mut u8 as *mut c_void);
                }
                ffmpeg_sys_next::avio_context_free(avio);
                drop(Box::from_raw(reader));
            };

            let mut format_context: *mut AVFormatContext = ffmpeg_sys_next::avformat_alloc_context();
            if format_context.is_null() {
                release_io(&mut avio);
                return Err(VmafError::ResourceAllocation("format context".to_string()));
            }
            (*format_context).pb = avio;
            (*format_context).flags |= ffmpeg_sys_next::AVFMT_FLAG_CUSTOM_IO as c_int;

            let open_result = ffmpeg_sys_next::avformat_open_input(
                &mut format_context,
                ptr::null(),
                ptr::null(),
                ptr::null_mut(),
            );
            if open_result < 0 {
                release_io(&mut avio);
                return Err(open_error(ffmpeg_next::Error::from(open_result).to_string()));
            }

            let info_result =
                ffmpeg_sys_next::avformat_find_stream_info(format_context, ptr::null_mut());
            if info_result < 0 {
                ffmpeg_sys_next::avformat_close_input(&mut format_context);
                release_io(&mut avio);
                return Err(open_error(format!(
                    "could not read stream info: {}",
                    ffmpeg_next::Error::from(info_result)
                )));
            }

            Ok(Self {
                input: ManuallyDrop::new(Input::wrap(format_context)),
                avio,
                reader,
            })
        }
    }
}

impl Deref for MemoryInput {
    type Target = Input;

    fn deref(&self) -> &Input {
        &self.input
    }
}

impl DerefMut for MemoryInput {
    fn deref_mut(&mut self) -> &mut Input {
        &mut self.input
    }
}

impl Drop for MemoryInput {
    fn drop(&mut self) {
        // SAFETY: the format context is closed first; with AVFMT_FLAG_CUSTOM_IO
        // set it leaves `pb` alone, so the AVIO context and the reader it
        // points at are released afterwards, exactly once.
        unsafe {
            ManuallyDrop::drop(&mut self.input);
            if !self.avio.is_null() {
                if !(*self.avio).buffer.is_null() {
                    ffmpeg_sys_next::av_freep(
                        &mut (*self.avio).buffer as *mut *mut u8 as *mut c_void,
                    );
                }
                ffmpeg_sys_next::avio_context_free(&mut self.avio);
            }
            if !self.reader.is_null() {
                drop(Box::from_raw(self.reader));
            }
        }
    }
}
