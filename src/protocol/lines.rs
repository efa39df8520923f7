/// A line extracted from a channel buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawLine {
    Complete(String),
    /// A partial line outgrew the buffer limit and was discarded.
    Overflow,
}

/// Per-channel accumulator that splits chunks on `\n`.
#[derive(Debug)]
pub struct LineBuffer {
    pending: Vec<u8>,
    max_line_bytes: usize,
    discarding: bool,
}

impl LineBuffer {
    pub fn new(max_line_bytes: usize) -> Self {
        Self {
            pending: Vec::new(),
            max_line_bytes: max_line_bytes.max(1),
            discarding: false,
        }
    }

    /// Append a chunk and return every line it completes, in order.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<RawLine> {
        let mut lines = Vec::new();
        let mut rest = chunk;
        while let Some(pos) = rest.iter().position(|&b| b == b'\n') {
            let (head, tail) = rest.split_at(pos);
            rest = &tail[1..];
            if self.discarding {
                // Tail of an overflowed line.
                self.discarding = false;
                continue;
            }
            if self.pending.len() + head.len() > self.max_line_bytes {
                self.pending.clear();
                lines.push(RawLine::Overflow);
                continue;
            }
            self.pending.extend_from_slice(head);
            lines.push(RawLine::Complete(take_line(&mut self.pending)));
        }

        if !self.discarding && !rest.is_empty() {
            if self.pending.len() + rest.len() > self.max_line_bytes {
                self.pending.clear();
                self.discarding = true;
                lines.push(RawLine::Overflow);
            } else {
                self.pending.extend_from_slice(rest);
            }
        }
        lines
    }

    /// Bytes held back waiting for a newline.
    #[cfg(test)]
    pub(crate) fn pending_len(&self) -> usize {
        self.pending.len()
    }
}

fn take_line(pending: &mut Vec<u8>) -> String {
    if pending.last() == Some(&b'\r') {
        pending.pop();
    }
    let line = String::from_utf8_lossy(pending).into_owned();
    pending.clear();
    line
}
