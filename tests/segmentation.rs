use streamdoc::segment::{parse_segments, GroupState, Segment, ToolKind};
use streamdoc::stream::{AssembledMessage, Delta, FreezeReason};

fn call(name: &str, kind: &str, body: &str) -> String {
    format!("<action name=\"{name}\" type=\"{kind}\">{body}</action>")
}

fn group_shape(segments: &[Segment]) -> Vec<(String, ToolKind, usize, GroupState)> {
    segments
        .iter()
        .filter_map(|segment| match segment {
            Segment::ToolCallGroup(group) => Some((
                group.name.clone(),
                group.kind,
                group.count(),
                group.state,
            )),
            _ => None,
        })
        .collect()
}

#[test]
fn grouping_follows_name_and_kind() {
    let text = [
        call("search", "externalTool", "<q>a</q>"),
        call("search", "externalTool", "<q>b</q>"),
        call("summarize", "skill", ""),
        call("search", "externalTool", "<q>c</q>"),
    ]
    .join("\n");
    assert_eq!(
        group_shape(&parse_segments(&text, false)),
        vec![
            ("search".into(), ToolKind::ExternalTool, 2, GroupState::Completed),
            ("summarize".into(), ToolKind::Skill, 1, GroupState::Completed),
            ("search".into(), ToolKind::ExternalTool, 1, GroupState::Completed),
        ]
    );
}

#[test]
fn streaming_message_then_frozen_message() {
    let mut message = AssembledMessage::new();
    message.apply(Delta::ReasoningFragment("look it up".into()));
    message.apply(Delta::ContentFragment(
        "<tool_action name=\"fetch\"><url>https://example.com".into(),
    ));

    let live = message.segments();
    assert_eq!(
        group_shape(&live),
        vec![("fetch".into(), ToolKind::ExternalTool, 1, GroupState::Running)]
    );

    message.freeze(FreezeReason::Completed);
    let done = message.segments();
    assert_eq!(
        group_shape(&done),
        vec![("fetch".into(), ToolKind::ExternalTool, 1, GroupState::Completed)]
    );
    let Segment::ToolCallGroup(group) = &done[1] else {
        panic!("expected group");
    };
    let params = group.invocations[0].params().unwrap();
    assert_eq!(params[0].name, "url");
    assert_eq!(params[0].value, "https://example.com");
}

#[test]
fn both_invocation_tag_forms_are_recognised() {
    let text = "<tool_action name=\"a\"></tool_action><action name=\"a\"></action>";
    let segments = parse_segments(text, false);
    assert_eq!(
        group_shape(&segments),
        vec![("a".into(), ToolKind::ExternalTool, 2, GroupState::Completed)]
    );
}

#[test]
fn reasoning_aliases() {
    for (open, close) in [
        ("<thinking>", "</thinking>"),
        ("<think>", "</think>"),
        ("<reasoning>", "</reasoning>"),
    ] {
        let text = format!("{open}inner{close}after");
        let segments = parse_segments(&text, false);
        assert!(matches!(&segments[0], Segment::Reasoning(r) if r.text == "inner"));
        assert!(matches!(&segments[1], Segment::PlainText(t) if t.text == "after"));
    }
}

#[test]
fn failed_group_only_after_stream_ends() {
    let text = call("deploy", "builtin", "<status>deployment failed</status>");
    assert_eq!(group_shape(&parse_segments(&text, true))[0].3, GroupState::Running);
    assert_eq!(group_shape(&parse_segments(&text, false))[0].3, GroupState::Failed);
}

#[test]
fn spans_reproduce_the_source() {
    let text = format!(
        "<thinking>why</thinking>\nIntro text.\n{}\n{}\nOutro",
        call("x", "skill", "<p>1</p>"),
        call("x", "skill", "<p>2</p>")
    );
    let segments = parse_segments(&text, false);
    let rebuilt: String = segments
        .iter()
        .map(|segment| &text[segment.span().range()])
        .collect::<Vec<_>>()
        .join("\n");
    let squash = |s: &str| s.split_whitespace().collect::<String>();
    assert_eq!(squash(&rebuilt), squash(&text));
}

#[test]
fn streamed_reasoning_yields_steps() {
    let mut message = AssembledMessage::new();
    for fragment in ["[Reasoning]: the build ", "is red\n[Thinking]: check CI", " logs\n"] {
        message.apply(Delta::ReasoningFragment(fragment.into()));
    }
    message.apply(Delta::ContentFragment("Found it.".into()));
    message.freeze(FreezeReason::Completed);

    let segments = message.segments();
    let Segment::Reasoning(reasoning) = &segments[0] else {
        panic!("expected reasoning");
    };
    let steps: Vec<String> = reasoning.steps().into_iter().map(|s| s.content).collect();
    assert_eq!(steps, vec!["the build is red", "check CI logs"]);
}
