use super::{GroupState, RawInvocation, Segment, SourceSpan, ToolCallGroup};

/// Accumulates adjacent invocations that share `(name, kind)`.
#[derive(Debug, Default)]
pub(crate) struct ToolCallGrouper {
    pending: Vec<RawInvocation>,
}

impl ToolCallGrouper {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn push(&mut self, invocation: RawInvocation, out: &mut Vec<Segment>) {
        let starts_new_group = self
            .pending
            .first()
            .is_some_and(|head| head.name() != invocation.name() || head.kind() != invocation.kind());
        if starts_new_group {
            self.flush(out);
        }
        self.pending.push(invocation);
    }

    /// Emit the accumulated invocations as one group. No-op when empty.
    ///
    /// The group starts out Completed; the parser assigns the final state once
    /// every segment is known.
    pub(crate) fn flush(&mut self, out: &mut Vec<Segment>) {
        let (Some(first), Some(last)) = (self.pending.first(), self.pending.last()) else {
            return;
        };
        let span = SourceSpan::new(first.span().start, last.span().end);
        let name = first.name().to_string();
        let kind = first.kind();
        out.push(Segment::ToolCallGroup(ToolCallGroup {
            name,
            kind,
            invocations: std::mem::take(&mut self.pending),
            state: GroupState::Completed,
            span,
        }));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::segment::ToolKind;

    fn invocation(name: &str, kind: &str, at: usize) -> RawInvocation {
        let raw = format!("<tool_action name=\"{name}\" type=\"{kind}\"></tool_action>");
        let open_len = raw.find('>').map_or(0, |gt| gt + 1);
        RawInvocation::new(&raw, SourceSpan::new(at, at + raw.len()), open_len..open_len, true)
    }

    #[test]
    fn test_same_key_accumulates() {
        let mut grouper = ToolCallGrouper::new();
        let mut out = Vec::new();
        grouper.push(invocation("read", "skill", 0), &mut out);
        grouper.push(invocation("read", "skill", 100), &mut out);
        assert!(out.is_empty());
        grouper.flush(&mut out);
        assert_eq!(out.len(), 1);
        let Segment::ToolCallGroup(group) = &out[0] else {
            panic!("expected group");
        };
        assert_eq!(group.invocations.len(), 2);
        assert_eq!(group.kind, ToolKind::Skill);
        assert_eq!(group.span.start, 0);
        assert_eq!(group.span.end, group.invocations[1].span().end);
    }

    #[test]
    fn test_kind_change_starts_new_group() {
        let mut grouper = ToolCallGrouper::new();
        let mut out = Vec::new();
        grouper.push(invocation("read", "skill", 0), &mut out);
        grouper.push(invocation("read", "builtin", 100), &mut out);
        assert_eq!(out.len(), 1);
        grouper.flush(&mut out);
        assert_eq!(out.len(), 2);
    }

    #[test]
    fn test_flush_when_empty_is_noop() {
        let mut grouper = ToolCallGrouper::new();
        let mut out = Vec::new();
        grouper.flush(&mut out);
        grouper.flush(&mut out);
        assert!(out.is_empty());
    }
}
