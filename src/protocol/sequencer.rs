use super::messages::FrameState;

/// A frame ready for the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaggedFrame {
    pub index: u64,
    pub state: FrameState,
    pub data: Vec<u8>,
}

/// Tags frames FIRST / MIDDLE / LAST for a source of unknown length.
///
/// One frame is always held back, so the final frame can be marked LAST
/// when the source ends. A session always carries exactly one FIRST and
/// exactly one LAST: a single frame is followed by a silent LAST, and an
/// empty source becomes a silent FIRST plus a silent LAST.
#[derive(Debug, Default)]
pub struct FrameSequencer {
    held: Option<Vec<u8>>,
    emitted: u64,
}

impl FrameSequencer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a frame; returns the previously held one, now safe to send.
    pub fn push(&mut self, data: Vec<u8>) -> Option<TaggedFrame> {
        let previous = self.held.replace(data)?;
        Some(self.tag(previous, false))
    }

    /// Flush at end of input. `silence` produces a silent frame when one is
    /// needed to complete the sequence.
    pub fn finish<E>(
        &mut self,
        mut silence: impl FnMut() -> Result<Vec<u8>, E>,
    ) -> Result<Vec<TaggedFrame>, E> {
        let mut out = Vec::with_capacity(2);

        let held = match self.held.take() {
            Some(held) => held,
            None => silence()?,
        };

        if self.emitted == 0 {
            out.push(self.tag(held, false));
            let tail = silence()?;
            out.push(self.tag(tail, true));
        } else {
            out.push(self.tag(held, true));
        }

        Ok(out)
    }

    /// Frames tagged so far.
    pub fn emitted(&self) -> u64 {
        self.emitted
    }

    fn tag(&mut self, data: Vec<u8>, last: bool) -> TaggedFrame {
        let state = if last {
            FrameState::Last
        } else if self.emitted == 0 {
            FrameState::First
        } else {
            FrameState::Middle
        };
        let frame = TaggedFrame {
            index: self.emitted,
            state,
            data,
        };
        self.emitted += 1;
        frame
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::convert::Infallible;

    fn silence() -> Result<Vec<u8>, Infallible> {
        Ok(vec![0])
    }

    fn states(frames: &[TaggedFrame]) -> Vec<FrameState> {
        frames.iter().map(|f| f.state).collect()
    }

    #[test]
    fn test_many_frames() {
        let mut seq = FrameSequencer::new();
        let mut out = Vec::new();
        for i in 1..=4u8 {
            out.extend(seq.push(vec![i]));
        }
        out.extend(seq.finish(silence).unwrap());

        assert_eq!(
            states(&out),
            vec![
                FrameState::First,
                FrameState::Middle,
                FrameState::Middle,
                FrameState::Last
            ]
        );
        assert_eq!(out.last().unwrap().data, vec![4]);
        assert_eq!(
            out.iter().map(|f| f.index).collect::<Vec<_>>(),
            vec![0, 1, 2, 3]
        );
    }

    #[test]
    fn test_single_frame_gets_silent_last() {
        let mut seq = FrameSequencer::new();
        assert!(seq.push(vec![7]).is_none());
        let out = seq.finish(silence).unwrap();

        assert_eq!(states(&out), vec![FrameState::First, FrameState::Last]);
        assert_eq!(out[0].data, vec![7]);
        assert_eq!(out[1].data, vec![0]);
    }

    #[test]
    fn test_empty_source() {
        let mut seq = FrameSequencer::new();
        let out = seq.finish(silence).unwrap();
        assert_eq!(states(&out), vec![FrameState::First, FrameState::Last]);
        assert_eq!(seq.emitted(), 2);
    }

    #[test]
    fn test_two_frames() {
        let mut seq = FrameSequencer::new();
        let mut out: Vec<_> = seq.push(vec![1]).into_iter().collect();
        out.extend(seq.push(vec![2]));
        out.extend(seq.finish(silence).unwrap());
        assert_eq!(states(&out), vec![FrameState::First, FrameState::Last]);
        assert_eq!(out[1].data, vec![2]);
    }
}
