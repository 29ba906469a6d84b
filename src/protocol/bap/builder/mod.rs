//! CAN frame generator for BAP messages. Picks the short or long framing from
//! the payload size and yields frames lazily.
use super::{
    BapHeader, FrameKind, CONTINUATION_CHUNK, MAX_LONG_PAYLOAD, SHORT_PAYLOAD_MAX, START_CHUNK,
};
use crate::error::BapEncodeError;
use crate::protocol::transport::can_frame::CanFrame;

/// Parameters shared by every frame of one message.
#[derive(Debug, Clone, Copy)]
pub struct BapFrameBuilder<'a> {
    can_id: u32,
    header: BapHeader,
    payload: &'a [u8],
    group: u8,
}

impl<'a> BapFrameBuilder<'a> {
    /// Validate the header fields and payload length for `can_id` (29-bit).
    pub fn new(can_id: u32, header: BapHeader, payload: &'a [u8]) -> Result<Self, BapEncodeError> {
        if header.device_id > 0x3F {
            return Err(BapEncodeError::InvalidDeviceId {
                device_id: header.device_id,
            });
        }
        if header.function_id > 0x3F {
            return Err(BapEncodeError::InvalidFunctionId {
                function_id: header.function_id,
            });
        }
        if payload.len() > MAX_LONG_PAYLOAD {
            return Err(BapEncodeError::PayloadTooLarge {
                len: payload.len(),
                max: MAX_LONG_PAYLOAD,
            });
        }
        Ok(Self {
            can_id,
            header,
            payload,
            group: 0,
        })
    }

    /// Message group (0..=3) used for long framing.
    pub fn with_group(mut self, group: u8) -> Self {
        self.group = group & 0x03;
        self
    }

    pub fn is_short(&self) -> bool {
        self.payload.len() <= SHORT_PAYLOAD_MAX
    }

    /// Number of frames [`Self::build`] will yield.
    pub fn frame_count(&self) -> usize {
        if self.is_short() {
            1
        } else {
            let rest = self.payload.len().saturating_sub(START_CHUNK);
            1 + rest.div_ceil(CONTINUATION_CHUNK)
        }
    }

    pub fn build(self) -> FrameIterator<'a> {
        FrameIterator {
            builder: self,
            next_frame: 0,
            bytes_sent: 0,
        }
    }
}

/// Lazy iterator returning frames one by one as they are encoded.
pub struct FrameIterator<'a> {
    builder: BapFrameBuilder<'a>,
    next_frame: usize,
    bytes_sent: usize,
}

impl<'a> Iterator for FrameIterator<'a> {
    type Item = CanFrame;

    fn next(&mut self) -> Option<Self::Item> {
        let builder = &self.builder;
        let total = builder.payload.len();
        let mut data = [0u8; 8];

        let len = if builder.is_short() {
            if self.next_frame > 0 {
                return None;
            }
            data[..2].copy_from_slice(&builder.header.encode());
            data[2..2 + total].copy_from_slice(builder.payload);
            self.bytes_sent = total;
            2 + total
        } else if self.next_frame == 0 {
            let header = builder.header.encode();
            data[0] = FrameKind::start_byte(builder.group);
            data[1] = total as u8;
            data[2..4].copy_from_slice(&header);
            data[4..8].copy_from_slice(&builder.payload[..START_CHUNK]);
            self.bytes_sent = START_CHUNK;
            8
        } else {
            if self.bytes_sent >= total {
                return None;
            }
            // Continuation indices start at 0 on the frame after the start.
            let index = ((self.next_frame - 1) & 0x0F) as u8;
            let take = (total - self.bytes_sent).min(CONTINUATION_CHUNK);
            data[0] = FrameKind::continuation_byte(builder.group, index);
            data[1..1 + take]
                .copy_from_slice(&builder.payload[self.bytes_sent..self.bytes_sent + take]);
            self.bytes_sent += take;
            1 + take
        };

        self.next_frame += 1;
        Some(CanFrame::new_extended(builder.can_id, &data[..len]))
    }
}
