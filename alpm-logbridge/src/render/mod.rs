//! Bounded message rendering.
//!
//! Every renderer follows the `snprintf` contract: write at most
//! `buf.len() - 1` bytes, terminate with a NUL, and report the length the
//! full message would have had.

pub mod native;

use std::fmt;

pub trait Render {
    /// Renders into `buf`, which is at least one byte long. Returns the
    /// untruncated length without terminator, or `None` if formatting failed.
    ///
    /// Repeated calls give the same result while `can_render_again` holds.
    fn render(&mut self, buf: &mut [u8]) -> Option<usize>;

    /// Whether another `render` would produce the message again.
    fn can_render_again(&self) -> bool {
        true
    }
}

impl Render for fmt::Arguments<'_> {
    fn render(&mut self, buf: &mut [u8]) -> Option<usize> {
        let mut writer = BoundedWriter::new(buf);
        let result = fmt::write(&mut writer, *self);
        let required = writer.finish();
        result.ok().map(|_| required)
    }
}

/// `fmt::Write` sink that keeps counting once the buffer is full.
pub struct BoundedWriter<'b> {
    buf: &'b mut [u8],
    written: usize,
    required: usize,
}

impl<'b> BoundedWriter<'b> {
    pub fn new(buf: &'b mut [u8]) -> Self {
        BoundedWriter {
            buf,
            written: 0,
            required: 0,
        }
    }

    /// Terminates the written bytes and returns the untruncated length.
    pub fn finish(self) -> usize {
        if let Some(end) = self.buf.get_mut(self.written) {
            *end = 0;
        }
        self.required
    }
}

impl fmt::Write for BoundedWriter<'_> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        let limit = self.buf.len().saturating_sub(1);
        let n = limit.saturating_sub(self.written).min(s.len());

        self.buf[self.written..self.written + n].copy_from_slice(&s.as_bytes()[..n]);
        self.written += n;
        self.required += s.len();
        Ok(())
    }
}
