use std::io::{self, ErrorKind, Write};

use bytes::BytesMut;

/// Transport write callback.
///
/// Invoked by the composer every time its send buffer is flushed. Must
/// preserve byte order and must not silently drop data.
pub trait FrameSink: Send {
    fn write_bytes(&mut self, bytes: &[u8]) -> io::Result<()>;
}

impl FrameSink for Vec<u8> {
    fn write_bytes(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.extend_from_slice(bytes);
        Ok(())
    }
}

impl FrameSink for BytesMut {
    fn write_bytes(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.extend_from_slice(bytes);
        Ok(())
    }
}

impl<S: FrameSink + ?Sized> FrameSink for Box<S> {
    fn write_bytes(&mut self, bytes: &[u8]) -> io::Result<()> {
        (**self).write_bytes(bytes)
    }
}

/// Adapts a closure into a [`FrameSink`].
pub struct FnSink<F>(F);

/// Use a closure as the transport write callback.
pub fn sink_fn<F>(f: F) -> FnSink<F>
where
    F: FnMut(&[u8]) -> io::Result<()> + Send,
{
    FnSink(f)
}

impl<F> FrameSink for FnSink<F>
where
    F: FnMut(&[u8]) -> io::Result<()> + Send,
{
    fn write_bytes(&mut self, bytes: &[u8]) -> io::Result<()> {
        (self.0)(bytes)
    }
}

/// Writes flushed frame bytes to any `Write` stream.
pub struct IoSink<W> {
    inner: W,
}

impl<W: Write> IoSink<W> {
    pub fn new(inner: W) -> Self {
        Self { inner }
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &W {
        &self.inner
    }

    /// Mutably borrow the underlying stream.
    pub fn get_mut(&mut self) -> &mut W {
        &mut self.inner
    }

    /// Consume the sink and return the inner stream.
    pub fn into_inner(self) -> W {
        self.inner
    }

    fn flush(&mut self) -> io::Result<()> {
        loop {
            match self.inner.flush() {
                Ok(()) => return Ok(()),
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) if err.kind() == ErrorKind::WouldBlock => continue,
                Err(err) => return Err(err),
            }
        }
    }
}

impl<W: Write + Send> FrameSink for IoSink<W> {
    fn write_bytes(&mut self, bytes: &[u8]) -> io::Result<()> {
        let mut offset = 0usize;
        while offset < bytes.len() {
            match self.inner.write(&bytes[offset..]) {
                Ok(0) => {
                    return Err(io::Error::new(
                        ErrorKind::WriteZero,
                        "transport accepted zero bytes",
                    ))
                }
                Ok(n) => offset += n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) if err.kind() == ErrorKind::WouldBlock => continue,
                Err(err) => return Err(err),
            }
        }

        self.flush()
    }
}
