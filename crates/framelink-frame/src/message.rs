use std::any::Any;
use std::fmt;

use bytes::Bytes;

use crate::hex;

/// Opaque per-query state carried between a query and its response.
pub type Userdata = Option<Box<dyn Any + Send>>;

/// A typed message carried in one frame.
#[derive(Default)]
pub struct Message {
    /// Frame ID. Allocated on send unless `is_response` is set.
    pub frame_id: u32,
    /// Reuse `frame_id` instead of allocating a new one.
    pub is_response: bool,
    /// Application-level message type (channel selector).
    pub msg_type: u32,
    /// Message payload.
    pub payload: Bytes,
    /// First userdata slot, see [`Userdata`].
    pub userdata: Userdata,
    /// Second userdata slot, see [`Userdata`].
    pub userdata2: Userdata,
}

impl Message {
    /// Create a new (non-response) message.
    pub fn new(msg_type: u32, payload: impl Into<Bytes>) -> Self {
        Self {
            msg_type,
            payload: payload.into(),
            ..Self::default()
        }
    }

    /// Create a response that reuses `frame_id`.
    pub fn response(frame_id: u32, msg_type: u32, payload: impl Into<Bytes>) -> Self {
        Self {
            frame_id,
            is_response: true,
            msg_type,
            payload: payload.into(),
            ..Self::default()
        }
    }

    /// Build a response to this message, keeping its ID and type.
    pub fn reply(&self, payload: impl Into<Bytes>) -> Self {
        Self::response(self.frame_id, self.msg_type, payload)
    }

    /// Attach the first userdata slot.
    pub fn with_userdata(mut self, data: impl Any + Send) -> Self {
        self.userdata = Some(Box::new(data));
        self
    }

    /// Attach the second userdata slot.
    pub fn with_userdata2(mut self, data: impl Any + Send) -> Self {
        self.userdata2 = Some(Box::new(data));
        self
    }

    /// Borrow the first userdata slot as `T`.
    pub fn userdata_ref<T: Any>(&self) -> Option<&T> {
        self.userdata.as_ref().and_then(|data| data.downcast_ref())
    }

    /// Mutably borrow the first userdata slot as `T`.
    pub fn userdata_mut<T: Any>(&mut self) -> Option<&mut T> {
        self.userdata.as_mut().and_then(|data| data.downcast_mut())
    }

    /// Payload length.
    pub fn len(&self) -> usize {
        self.payload.len()
    }

    /// Returns true if the payload is empty.
    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }
}

impl fmt::Debug for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Message")
            .field("frame_id", &self.frame_id)
            .field("is_response", &self.is_response)
            .field("msg_type", &self.msg_type)
            .field("payload", &self.payload)
            .field("userdata", &self.userdata.is_some())
            .field("userdata2", &self.userdata2.is_some())
            .finish()
    }
}

/// Frame info dump: type, length, ID and a printable view of the data.
impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "type={:#04x} len={} id={:#x}",
            self.msg_type,
            self.len(),
            self.frame_id
        )?;
        if !self.payload.is_empty() {
            write!(f, " data={}", hex::preview(&self.payload))?;
        }
        Ok(())
    }
}
