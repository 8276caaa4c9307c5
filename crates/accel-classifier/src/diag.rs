//! Bounded XML diagnostic records
//!
//! Classifier state is exported as compact, self-describing XML elements
//! written into caller-supplied buffers. The return convention is shared
//! across the diagnostic boundary: a result of `0` or of exactly the buffer
//! capacity signals failure or truncation, anything else is the exact byte
//! count written. Callers detect truncation without the writer ever
//! overrunning the buffer.

use std::fmt::{self, Write};

use crate::{AccelMode, ProcessResponse, Relevance};

/// Formatter writing into a fixed byte buffer, tracking truncation
pub struct BoundedWriter<'a> {
    buf: &'a mut [u8],
    pos: usize,
    truncated: bool,
}

impl<'a> BoundedWriter<'a> {
    /// Wrap a buffer
    pub fn new(buf: &'a mut [u8]) -> Self {
        Self {
            buf,
            pos: 0,
            truncated: false,
        }
    }

    /// Bytes written so far
    pub fn written(&self) -> usize {
        self.pos
    }

    /// Whether any write did not fit
    pub fn is_truncated(&self) -> bool {
        self.truncated
    }

    /// Collapse into the diagnostic return convention: the byte count on
    /// success, the full capacity on truncation
    pub fn finish(self) -> usize {
        if self.truncated {
            self.buf.len()
        } else {
            self.pos
        }
    }
}

impl Write for BoundedWriter<'_> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        let avail = self.buf.len() - self.pos;
        let bytes = s.as_bytes();
        if bytes.len() > avail {
            self.buf[self.pos..].copy_from_slice(&bytes[..avail]);
            self.pos = self.buf.len();
            self.truncated = true;
        } else {
            self.buf[self.pos..self.pos + bytes.len()].copy_from_slice(bytes);
            self.pos += bytes.len();
        }
        Ok(())
    }
}

/// Write one `<pr .../>` element describing a process response
///
/// Returns per the bounded formatting convention of this module. The
/// `Maybe` branch deliberately reports `accel="denied"` whatever the
/// response's acceleration field says: an undetermined classifier holds
/// acceleration back, and the diagnostic output reflects that.
pub fn process_response_state(buf: &mut [u8], pr: &ProcessResponse) -> usize {
    let mut w = BoundedWriter::new(buf);

    if pr.relevance == Relevance::No {
        let _ = write!(w, "<pr relevant=\"no\"/>\n");
        return w.finish();
    }

    let relevance_attr = if pr.relevance == Relevance::Maybe {
        " relevant=\"maybe\""
    } else {
        " relevant=\"yes\""
    };

    let _ = write!(
        w,
        "<pr{} became_relevant=\"{}\"",
        relevance_attr,
        pr.became_relevant.as_secs()
    );

    if let Some(drop) = pr.drop {
        let _ = write!(w, " drop=\"{}\"", if drop { "yes" } else { "no" });
    }

    if let Some(tags) = pr.qos_tags {
        let _ = write!(
            w,
            " flow_qos_tag=\"{}\" return_qos_tag=\"{}\"",
            tags.flow, tags.ret
        );
    }

    if let Some(group) = pr.timer_group {
        let _ = write!(w, " timer_group=\"{}\"", group as u8);
    }

    if pr.relevance == Relevance::Maybe {
        let _ = write!(w, " accel=\"denied\"");
    } else if let Some(mode) = pr.accel_mode {
        match mode {
            AccelMode::Accel => {
                let _ = write!(w, " accel=\"wanted\"");
            }
            AccelMode::No => {
                let _ = write!(w, " accel=\"denied\"");
            }
            AccelMode::DontCare => {}
        }
    }

    if let Some(marks) = pr.dscp {
        let _ = write!(
            w,
            " flow_dscp=\"{}\" return_dscp=\"{}\"",
            marks.flow, marks.ret
        );
    }
    if pr.dscp_deny {
        let _ = write!(w, " dscp_deny=\"yes\"");
    }

    let _ = write!(w, "/>\n");
    w.finish()
}
