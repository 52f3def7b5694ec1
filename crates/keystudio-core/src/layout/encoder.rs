//! Encoder grouping heuristic.
//!
//! VIA descriptors draw one rotary encoder as up to three adjacent blocks
//! (counter-clockwise, press, clockwise) without saying they belong together.
//! [`EncoderGrouper`] infers the grouping from matrix hints: a block whose
//! hint is on the same row as, and one column right of, the previous encoder
//! block joins that block's group.  Everything else starts a new group.

/// Largest number of blocks one physical encoder is drawn with.
pub const MAX_ENCODER_SPAN: usize = 3;

/// `(row, col)` parsed from an encoder block's first label line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatrixHint {
    pub row: u32,
    pub col: u32,
}

/// Outcome of placing one encoder block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncoderAssignment {
    /// Joined the previous block's group.
    Joined(u32),
    /// Started a new group.
    Fresh(u32),
    /// Was adjacent to a group that already spans [`MAX_ENCODER_SPAN`]
    /// blocks, so a new group was started instead.
    Overflow(u32),
}

impl EncoderAssignment {
    pub fn encoder_id(self) -> u32 {
        match self {
            Self::Joined(id) | Self::Fresh(id) | Self::Overflow(id) => id,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct LastEncoder {
    hint: MatrixHint,
    id: u32,
    span: usize,
}

/// State machine tracking the last encoder hint seen during one
/// normalization pass.
#[derive(Debug, Default)]
pub struct EncoderGrouper {
    last: Option<LastEncoder>,
    next_id: u32,
}

impl EncoderGrouper {
    pub fn new() -> Self {
        Self::default()
    }

    /// Assigns an encoder id to the next encoder block.
    pub fn assign(&mut self, hint: Option<MatrixHint>) -> EncoderAssignment {
        let Some(hint) = hint else {
            // Blocks without a hint can neither join nor be joined.
            self.last = None;
            return EncoderAssignment::Fresh(self.allocate());
        };

        let adjacent = self.last.filter(|last| {
            last.hint.row == hint.row && last.hint.col.checked_add(1) == Some(hint.col)
        });

        let assignment = match adjacent {
            Some(last) if last.span < MAX_ENCODER_SPAN => {
                self.last = Some(LastEncoder {
                    hint,
                    id: last.id,
                    span: last.span + 1,
                });
                return EncoderAssignment::Joined(last.id);
            }
            Some(_) => EncoderAssignment::Overflow(self.allocate()),
            None => EncoderAssignment::Fresh(self.allocate()),
        };

        self.last = Some(LastEncoder {
            hint,
            id: assignment.encoder_id(),
            span: 1,
        });
        assignment
    }

    fn allocate(&mut self) -> u32 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn hint(row: u32, col: u32) -> Option<MatrixHint> {
        Some(MatrixHint { row, col })
    }

    #[test]
    fn test_adjacent_hints_share_an_id() {
        // Arrange
        let mut grouper = EncoderGrouper::new();

        // Act
        let first = grouper.assign(hint(2, 0));
        let second = grouper.assign(hint(2, 1));
        let third = grouper.assign(hint(2, 2));

        // Assert
        assert_eq!(first, EncoderAssignment::Fresh(0));
        assert_eq!(second, EncoderAssignment::Joined(0));
        assert_eq!(third, EncoderAssignment::Joined(0));
    }

    #[test]
    fn test_different_row_starts_new_group() {
        let mut grouper = EncoderGrouper::new();
        grouper.assign(hint(2, 0));
        assert_eq!(grouper.assign(hint(3, 1)), EncoderAssignment::Fresh(1));
    }

    #[test]
    fn test_column_gap_starts_new_group() {
        let mut grouper = EncoderGrouper::new();
        grouper.assign(hint(2, 0));
        assert_eq!(grouper.assign(hint(2, 2)), EncoderAssignment::Fresh(1));
    }

    #[test]
    fn test_fourth_adjacent_block_overflows() {
        let mut grouper = EncoderGrouper::new();
        for col in 0..3 {
            grouper.assign(hint(0, col));
        }
        assert_eq!(grouper.assign(hint(0, 3)), EncoderAssignment::Overflow(1));
        // The overflow block anchors a new group of its own.
        assert_eq!(grouper.assign(hint(0, 4)), EncoderAssignment::Joined(1));
    }

    #[test]
    fn test_missing_hint_breaks_adjacency() {
        let mut grouper = EncoderGrouper::new();
        grouper.assign(hint(1, 0));
        assert_eq!(grouper.assign(None), EncoderAssignment::Fresh(1));
        assert_eq!(grouper.assign(hint(1, 1)), EncoderAssignment::Fresh(2));
    }
}
