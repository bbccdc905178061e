use uuid::Uuid;

/// The backtracking frames of a Sequential Search, from the baseline outwards.
///
/// Frame `k + 1` is the point chosen as the best move away from frame `k`. Backtracking to
/// frame `k` drops every frame above it, so the stack always describes a single path.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CurveStack {
    frames: Vec<Uuid>,
}

impl CurveStack {
    pub fn from_frames(frames: Vec<Uuid>) -> Self {
        Self { frames }
    }

    pub fn frames(&self) -> &[Uuid] {
        &self.frames
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn get(&self, depth: usize) -> Option<Uuid> {
        self.frames.get(depth).copied()
    }

    /// Makes `frame` the successor of the frame at `depth`.
    ///
    /// If it already is, the stack is unchanged. Otherwise every frame above `depth` is
    /// popped before `frame` is pushed.
    ///
    /// # Return
    ///
    /// The frames that were popped, lowest first.
    ///
    /// # Panics
    ///
    /// Panics if `depth` is not a frame of the stack.
    pub fn advance(&mut self, depth: usize, frame: Uuid) -> Vec<Uuid> {
        assert!(depth < self.frames.len(), "no curve frame at depth {}", depth);
        if self.get(depth + 1) == Some(frame) {
            return Vec::new();
        }
        let popped = self.truncate(depth + 1);
        self.frames.push(frame);
        popped
    }

    /// Keeps the lowest `len` frames.
    ///
    /// # Return
    ///
    /// The frames that were popped, lowest first.
    pub fn truncate(&mut self, len: usize) -> Vec<Uuid> {
        if len >= self.frames.len() {
            return Vec::new();
        }
        self.frames.split_off(len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(n: usize) -> Vec<Uuid> {
        (0..n).map(|_| Uuid::new_v4()).collect()
    }

    #[test]
    fn advancing_onto_the_existing_successor_keeps_the_stack() {
        let id = ids(3);
        let mut stack = CurveStack::from_frames(id.clone());

        let popped = stack.advance(0, id[1]);

        assert!(popped.is_empty());
        assert_eq!(stack.frames(), id.as_slice());
    }

    #[test]
    fn advancing_onto_a_new_successor_backtracks() {
        let id = ids(5);
        let mut stack = CurveStack::from_frames(id[..4].to_vec());

        let popped = stack.advance(1, id[4]);

        assert_eq!(popped, vec![id[2], id[3]]);
        assert_eq!(stack.frames(), &[id[0], id[1], id[4]]);
        assert_eq!(stack.get(2), Some(id[4]));
    }

    #[test]
    fn advancing_from_the_top_pushes() {
        let id = ids(2);
        let mut stack = CurveStack::from_frames(vec![id[0]]);

        assert!(stack.advance(0, id[1]).is_empty());
        assert_eq!(stack.len(), 2);
    }

    #[test]
    fn truncate_beyond_length_is_a_noop() {
        let id = ids(2);
        let mut stack = CurveStack::from_frames(id.clone());
        assert!(stack.truncate(5).is_empty());
        assert_eq!(stack.truncate(1), vec![id[1]]);
        assert_eq!(stack.len(), 1);
    }

    #[test]
    #[should_panic(expected = "no curve frame")]
    fn advancing_from_a_missing_frame_panics() {
        let mut stack = CurveStack::default();
        stack.advance(0, Uuid::new_v4());
    }
}
