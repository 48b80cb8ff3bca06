use super::*;

fn invocation(name: &str, body: &str) -> String {
    format!("<tool_action name=\"{name}\" type=\"skill\">{body}</tool_action>")
}

fn groups(segments: &[Segment]) -> Vec<&ToolCallGroup> {
    segments
        .iter()
        .filter_map(|segment| match segment {
            Segment::ToolCallGroup(group) => Some(group),
            _ => None,
        })
        .collect()
}

/// Every byte outside the segment spans is whitespace and spans are ordered.
fn assert_round_trip(text: &str, segments: &[Segment]) {
    let mut cursor = 0usize;
    for segment in segments {
        let span = segment.span();
        assert!(span.start >= cursor, "overlapping spans in {text:?}");
        assert!(!span.is_empty(), "empty span in {text:?}");
        if let Segment::PlainText(plain) = segment {
            assert_eq!(span.len(), plain.text.len());
        }
        assert!(
            text[cursor..span.start].trim().is_empty(),
            "dropped text {:?}",
            &text[cursor..span.start]
        );
        cursor = span.end;
    }
    assert!(text[cursor..].trim().is_empty(), "dropped tail {:?}", &text[cursor..]);
}

// -- plain text and reasoning -------------------------------------------

#[test]
fn empty_text_has_no_segments() {
    assert!(parse_segments("", true).is_empty());
    assert!(parse_segments("  \n\t ", false).is_empty());
}

#[test]
fn plain_text_is_kept_verbatim() {
    let segments = parse_segments("  # Title\n\nbody  ", false);
    assert_eq!(
        segments,
        vec![Segment::PlainText(TextSegment {
            text: "  # Title\n\nbody  ".into(),
            span: SourceSpan::new(0, 17),
        })]
    );
}

#[test]
fn reasoning_then_plain_text() {
    let segments = parse_segments("<thinking>thinking..</thinking>Hi", false);
    assert_eq!(segments.len(), 2);
    assert!(matches!(
        &segments[0],
        Segment::Reasoning(r) if r.text == "thinking.." && r.terminated
    ));
    assert!(matches!(&segments[1], Segment::PlainText(t) if t.text == "Hi"));
}

#[test]
fn unterminated_reasoning_runs_to_end() {
    let text = "intro <think>still <b>going";
    let segments = parse_segments(text, true);
    assert_eq!(segments.len(), 2);
    let Segment::Reasoning(reasoning) = &segments[1] else {
        panic!("expected reasoning");
    };
    assert_eq!(reasoning.text, "still <b>going");
    assert!(!reasoning.terminated);
    assert_eq!(reasoning.span.end, text.len());
}

#[test]
fn reasoning_segment_steps() {
    let text = "<thinking>Step 1: list the files\nStep 2: read main.rs\n</thinking>Done.";
    let segments = parse_segments(text, false);
    let Segment::Reasoning(reasoning) = &segments[0] else {
        panic!("expected reasoning");
    };
    let steps = reasoning.steps();
    assert_eq!(steps.len(), 2);
    assert_eq!(steps[0].content, "list the files");
    assert_eq!(steps[1].step, 2);
    assert_eq!(steps[1].marker, StepMarker::StepLine);
}

#[test]
fn empty_reasoning_is_a_segment() {
    let segments = parse_segments("<reasoning></reasoning>", false);
    assert!(matches!(&segments[0], Segment::Reasoning(r) if r.text.is_empty()));
}

// -- grouping -------------------------------------------------------------

#[test]
fn adjacent_same_name_invocations_group_a_a_b_a() {
    let text = [
        invocation("A", ""),
        invocation("A", ""),
        invocation("B", ""),
        invocation("A", ""),
    ]
    .concat();
    let segments = parse_segments(&text, false);
    let groups = groups(&segments);
    let shape: Vec<(&str, usize)> = groups
        .iter()
        .map(|group| (group.name.as_str(), group.invocations.len()))
        .collect();
    assert_eq!(shape, vec![("A", 2), ("B", 1), ("A", 1)]);
}

#[test]
fn whitespace_between_invocations_does_not_split_group() {
    let text = format!("{}\n\n  {}", invocation("A", ""), invocation("A", ""));
    let segments = parse_segments(&text, false);
    assert_eq!(segments.len(), 1);
    let Segment::ToolCallGroup(group) = &segments[0] else {
        panic!("expected group");
    };
    assert_eq!(group.invocations.len(), 2);
    assert_eq!(group.span, SourceSpan::new(0, text.len()));
}

#[test]
fn text_between_invocations_splits_group() {
    let text = format!("{}ok{}", invocation("A", ""), invocation("A", ""));
    let segments = parse_segments(&text, false);
    assert_eq!(segments.len(), 3);
    assert!(matches!(&segments[1], Segment::PlainText(t) if t.text == "ok"));
}

#[test]
fn reasoning_between_invocations_splits_group() {
    let text = format!(
        "{}<thinking>next</thinking>{}",
        invocation("A", ""),
        invocation("A", "")
    );
    assert_eq!(groups(&parse_segments(&text, false)).len(), 2);
}

#[test]
fn kind_is_part_of_the_group_key() {
    let text = "<action name=\"x\" type=\"skill\"/><action name=\"x\" type=\"builtin\"/>\
                <action name=\"x\"/>";
    let segments = parse_segments(text, false);
    let kinds: Vec<ToolKind> = groups(&segments).iter().map(|g| g.kind).collect();
    assert_eq!(
        kinds,
        vec![ToolKind::Skill, ToolKind::Builtin, ToolKind::ExternalTool]
    );
}

#[test]
fn missing_name_and_unknown_type_default() {
    let segments = parse_segments("<tool_action type=\"gadget\"></tool_action>", false);
    let group = groups(&segments)[0];
    assert_eq!(group.name, "unknown");
    assert_eq!(group.kind, ToolKind::ExternalTool);
}

#[test]
fn tool_kind_from_attr() {
    assert_eq!(ToolKind::from_attr(Some("Skill")), ToolKind::Skill);
    assert_eq!(ToolKind::from_attr(Some(" built-in ")), ToolKind::Builtin);
    assert_eq!(ToolKind::from_attr(Some("mcp")), ToolKind::ExternalTool);
    assert_eq!(ToolKind::from_attr(None), ToolKind::ExternalTool);
    assert_eq!(ToolKind::ExternalTool.as_str(), "externalTool");
}

// -- state ----------------------------------------------------------------

#[test]
fn trailing_unterminated_invocation_running_while_streaming() {
    let text = format!(
        "Let me look.{}<tool_action name=\"read\" type=\"skill\"><path>/tm",
        invocation("read", "")
    );
    let live = parse_segments(&text, true);
    assert!(live.last().is_some_and(Segment::is_running));

    let done = parse_segments(&text, false);
    assert!(done.iter().all(|segment| !segment.is_running()));
    let group = groups(&done)[0];
    assert_eq!(group.state, GroupState::Completed);
    assert!(!group.invocations[1].is_terminated());
}

#[test]
fn only_last_segment_may_be_running() {
    let text = format!("{}then{}", invocation("a", ""), invocation("b", ""));
    let segments = parse_segments(&text, true);
    let states: Vec<GroupState> = groups(&segments).iter().map(|g| g.state).collect();
    assert_eq!(states, vec![GroupState::Completed, GroupState::Running]);

    let segments = parse_segments(&format!("{}trailing", invocation("a", "")), true);
    assert!(segments.iter().all(|segment| !segment.is_running()));
}

#[test]
fn failure_marker_marks_group_failed() {
    let text = format!(
        "{}{}",
        invocation("run", "<cmd>ls</cmd>"),
        invocation("run", "<result>Command FAILED with code 2</result>")
    );
    let segments = parse_segments(&text, false);
    assert_eq!(groups(&segments)[0].state, GroupState::Failed);
}

#[test]
fn failure_marker_matches_inside_identifiers() {
    for body in [
        r#"<result>{"is_error": true, "content": "no such file"}</result>"#,
        "<result>TypeError: cannot read property 'x' of undefined</result>",
        "<error_message>permission denied</error_message>",
        "<status>Failure</status>",
    ] {
        let text = invocation("run", body);
        assert_eq!(
            groups(&parse_segments(&text, false))[0].state,
            GroupState::Failed,
            "{body}"
        );
    }

    let text = invocation("run", "<result>all 12 tests passed</result>");
    assert_eq!(groups(&parse_segments(&text, false))[0].state, GroupState::Completed);
}

#[test]
fn running_is_not_downgraded_to_failed() {
    let text = invocation("watch", "<msg>errors so far");
    let segments = parse_segments(&text, true);
    assert_eq!(groups(&segments)[0].state, GroupState::Running);
}

// -- invariants -----------------------------------------------------------

#[test]
fn parse_is_idempotent() {
    let text = format!(
        "<thinking>plan</thinking>\nStep one.\n{}{}<action name=\"z\">",
        invocation("a", "<p>1</p>"),
        invocation("a", "<p>2</p>")
    );
    for streaming in [true, false] {
        assert_eq!(parse_segments(&text, streaming), parse_segments(&text, streaming));
    }
}

#[test]
fn spans_cover_all_non_whitespace_text() {
    let samples = [
        "plain".to_string(),
        "<thinking>a</thinking>  b  <think>c".to_string(),
        format!("x {} \n {} y", invocation("a", "<p>1</p>"), invocation("a", "")),
        "<tool_action name=\"w\"><content>half".to_string(),
        "text <tool_action name=\"never closed".to_string(),
        "<action/>< action><actionable>".to_string(),
    ];
    for text in &samples {
        for streaming in [true, false] {
            assert_round_trip(text, &parse_segments(text, streaming));
        }
    }
}

#[test]
fn every_prefix_of_a_message_segments_cleanly() {
    let text = format!(
        "<thinking>plan it</thinking>Reading files.{}{}Done.",
        invocation("read", "<path>a.rs</path>"),
        invocation("read", "<path>b.rs</path>")
    );
    for end in (0..=text.len()).filter(|&end| text.is_char_boundary(end)) {
        let prefix = &text[..end];
        let segments = parse_segments(prefix, true);
        assert_round_trip(prefix, &segments);
        let running = segments.iter().filter(|segment| segment.is_running()).count();
        assert!(running <= 1);
        if running == 1 {
            assert!(segments.last().is_some_and(Segment::is_running));
        }
        assert!(parse_segments(prefix, false).iter().all(|s| !s.is_running()));
    }
}

// -- invocations ----------------------------------------------------------

#[test]
fn invocation_accessors() {
    let text = "<tool_action name=\"read\" type=\"skill\" id='c1'><path>a.rs</path></tool_action>";
    let segments = parse_segments(text, false);
    let call = &groups(&segments)[0].invocations[0];
    assert_eq!(call.raw(), text);
    assert_eq!(call.name(), "read");
    assert_eq!(call.kind(), ToolKind::Skill);
    assert_eq!(call.attribute("id"), Some("c1"));
    assert_eq!(call.attribute("missing"), None);
    assert_eq!(call.open_tag(), "<tool_action name=\"read\" type=\"skill\" id='c1'>");
    assert_eq!(call.body(), "<path>a.rs</path>");
    assert!(call.is_terminated());
    assert_eq!(call.span(), SourceSpan::new(0, text.len()));
}

#[test]
fn invocation_params_are_lazy_and_cached() {
    let text = invocation("write", "<path>out.txt</path><content>hi</content>");
    let segments = parse_segments(&text, false);
    let call = &groups(&segments)[0].invocations[0];
    let first = call.params().unwrap();
    assert_eq!(first.len(), 2);
    assert_eq!(first[1].value, "hi");
    let second = call.params().unwrap();
    assert!(std::ptr::eq(first.as_ptr(), second.as_ptr()));
}

#[test]
fn streaming_invocation_params_are_repaired() {
    let text = "<tool_action name=\"write\"><path>out.txt</path><content>partial";
    let segments = parse_segments(text, true);
    let params = groups(&segments)[0].invocations[0].params().unwrap();
    assert_eq!(params.len(), 2);
    assert_eq!(params[1].value, "partial");
}

#[test]
fn malformed_params_are_an_error_value() {
    let text = invocation("x", "<a>1</b>");
    let segments = parse_segments(&text, false);
    assert!(groups(&segments)[0].invocations[0].params().is_err());
}

#[test]
fn self_closing_invocation_has_no_params() {
    let segments = parse_segments("<action name=\"ping\" />", false);
    let call = &groups(&segments)[0].invocations[0];
    assert_eq!(call.body(), "");
    assert!(call.params().unwrap().is_empty());
}

#[test]
fn extract_attr_requires_attribute_boundary() {
    assert_eq!(
        extract_attr_ascii("<action rename=\"x\" name=\"y\">", b"name"),
        Some("y")
    );
    assert_eq!(extract_attr_ascii("<action name = ' z '>", b"name"), Some("z"));
    assert_eq!(extract_attr_ascii("<action name=unquoted>", b"name"), None);
}

// -- serialization --------------------------------------------------------

#[test]
fn segments_serialize_type_tagged() {
    let text = format!("<thinking>r</thinking>{}", invocation("read", "<path>a</path>"));
    let json = serde_json::to_value(parse_segments(&text, false)).unwrap();
    assert_eq!(json[0]["type"], "reasoning");
    assert_eq!(json[0]["text"], "r");
    assert_eq!(json[1]["type"], "toolCallGroup");
    assert_eq!(json[1]["kind"], "skill");
    assert_eq!(json[1]["state"], "completed");
    assert_eq!(json[1]["invocations"][0]["params"][0]["name"], "path");
    assert!(json[1]["invocations"][0]["paramsError"].is_null());
}

#[test]
fn params_error_serializes_alongside_invocation() {
    let text = invocation("x", "<a>1</b>");
    let json = serde_json::to_value(parse_segments(&text, false)).unwrap();
    let call = &json[0]["invocations"][0];
    assert_eq!(call["params"], serde_json::json!([]));
    assert!(call["paramsError"]["message"].is_string());
}
