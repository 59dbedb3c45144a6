//! The persisted answer format. All integers and floats are big-endian:
//!
//! ```text
//! "PSAP" width:u32 height:u32
//! { time:i32 count:u8 { action:u8 pointer_id:u32 x:f64 y:f64 }*count }*
//! ```
//!
//! Groups run until the end of the input.

use crate::core::geometry::Screen;
use crate::game::demand::Millis;
use crate::game::events::{EventStream, TouchAction, TouchEvent};
use glam::DVec2;
use thiserror::Error;

pub const MAGIC: &[u8; 4] = b"PSAP";
const HEADER_LEN: usize = 4 + 4 + 4;
const GROUP_HEADER_LEN: usize = 4 + 1;
const EVENT_LEN: usize = 1 + 4 + 8 + 8;

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("not a plan file (magic {0:?})")]
    BadMagic([u8; 4]),

    #[error("input ends at byte {offset}, {needed} more bytes expected")]
    Truncated { offset: usize, needed: usize },

    #[error("unknown touch action code {0}")]
    UnknownAction(u8),

    #[error("group at {time}ms holds {count} events, at most 255 fit")]
    GroupTooLarge { time: Millis, count: usize },
}

pub fn encode(stream: &EventStream) -> Result<Vec<u8>, CodecError> {
    let mut out = Vec::with_capacity(
        HEADER_LEN + stream.groups.len() * GROUP_HEADER_LEN + stream.event_count() * EVENT_LEN,
    );
    out.extend_from_slice(MAGIC);
    out.extend_from_slice(&stream.screen.width.to_be_bytes());
    out.extend_from_slice(&stream.screen.height.to_be_bytes());
    for (time, events) in &stream.groups {
        let count = u8::try_from(events.len()).map_err(|_| CodecError::GroupTooLarge {
            time: *time,
            count: events.len(),
        })?;
        out.extend_from_slice(&time.to_be_bytes());
        out.push(count);
        for event in events {
            out.push(event.action.code());
            out.extend_from_slice(&event.pointer_id.to_be_bytes());
            out.extend_from_slice(&event.position.x.to_be_bytes());
            out.extend_from_slice(&event.position.y.to_be_bytes());
        }
    }
    Ok(out)
}

struct Cursor<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn take<const N: usize>(&mut self) -> Result<[u8; N], CodecError> {
        let end = self.pos + N;
        let Some(bytes) = self.data.get(self.pos..end) else {
            return Err(CodecError::Truncated {
                offset: self.data.len(),
                needed: end - self.data.len(),
            });
        };
        self.pos = end;
        let mut out = [0u8; N];
        out.copy_from_slice(bytes);
        Ok(out)
    }

    #[inline(always)]
    fn at_end(&self) -> bool {
        self.pos >= self.data.len()
    }
}

pub fn decode(data: &[u8]) -> Result<EventStream, CodecError> {
    let mut cur = Cursor { data, pos: 0 };
    let magic: [u8; 4] = cur.take()?;
    if &magic != MAGIC {
        return Err(CodecError::BadMagic(magic));
    }
    let width = u32::from_be_bytes(cur.take()?);
    let height = u32::from_be_bytes(cur.take()?);

    let mut stream = EventStream::new(Screen::new(width, height));
    while !cur.at_end() {
        let time = i32::from_be_bytes(cur.take()?);
        let [count] = cur.take::<1>()?;
        let mut events = Vec::with_capacity(usize::from(count));
        for _ in 0..count {
            let [code] = cur.take::<1>()?;
            let action = TouchAction::from_code(code).ok_or(CodecError::UnknownAction(code))?;
            let pointer_id = u32::from_be_bytes(cur.take()?);
            let x = f64::from_be_bytes(cur.take()?);
            let y = f64::from_be_bytes(cur.take()?);
            events.push(TouchEvent::new(DVec2::new(x, y), action, pointer_id));
        }
        stream.groups.push((time, events));
    }
    Ok(stream)
}
