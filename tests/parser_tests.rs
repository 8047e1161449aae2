//! Streaming parser properties over whole transcripts.

use artifact_runner::action::{CommandKind, PartialAction, PartialKind};
use artifact_runner::parser::{
    ParserEvent, ParserStore, StreamingParser, fence::strip_code_fences,
};

const SCENARIO_A: &str =
    r#"<artifact id="a1" title="Demo"><action type="file" path="a.txt">hello</action></artifact>"#;

const TRANSCRIPT: &str = "I'll set up a Vite app for you.\n\n<artifact id=\"vite-app\" title=\"Vite App\">\n<action type=\"file\" path=\"package.json\">\n```json\n{\n  \"name\": \"demo\",\n  \"scripts\": { \"dev\": \"vite\" }\n}\n```\n</action>\n<action type=\"file\" path=\"src/main.ts\">\n```typescript\nconst el = document.querySelector<HTMLDivElement>('#app');\nif (el) el.innerHTML = `<h1>Hi</h1>`;\n```\n</action>\n<action type=\"unknown\">ignored</action>\n<action type=\"shell\">\nnpm install\n</action>\n<action type=\"start\">npm run dev</action>\n</artifact>\n\nOpen the preview once the server is up. Use <b>Ctrl+C</b> to stop it.";

fn parse_in_chunks(parser: &StreamingParser, text: &str, cuts: &[usize]) -> (String, Vec<ParserEvent>) {
    let mut store = ParserStore::new();
    let mut events = Vec::new();
    let mut output = String::new();
    for &end in cuts.iter().chain(std::iter::once(&text.len())) {
        output.push_str(&parser.parse(&mut store, "m", &text[..end], &mut events));
    }
    (output, events)
}

fn closed(events: &[ParserEvent]) -> Vec<PartialAction> {
    events
        .iter()
        .filter_map(|e| match e {
            ParserEvent::ActionClose { action, .. } => Some(action.clone()),
            _ => None,
        })
        .collect()
}

fn boundaries(text: &str) -> Vec<usize> {
    (1..text.len()).filter(|&i| text.is_char_boundary(i)).collect()
}

#[test]
fn test_scenario_a_single_call() {
    let parser = StreamingParser::default();
    let (output, events) = parser.parse_complete(SCENARIO_A);

    assert_eq!(output, "");
    let names: Vec<_> = events.iter().map(|e| e.name()).collect();
    assert_eq!(
        names,
        vec!["artifact_open", "action_open", "action_close", "artifact_close"]
    );
    let actions = closed(&events);
    assert_eq!(actions.len(), 1);
    assert_eq!(actions[0].path(), Some("a.txt"));
    assert_eq!(actions[0].content, "hello");
}

#[test]
fn test_scenario_b_three_chunks() {
    let parser = StreamingParser::default();
    let first = r#"<artifact id="a1" tit"#.len();
    let second = first + r#"le="Demo"><action type="file" path="a."#.len();

    let (output, events) = parse_in_chunks(&parser, SCENARIO_A, &[first, second]);
    let (expected_output, expected_events) = parser.parse_complete(SCENARIO_A);

    assert_eq!(output, expected_output);
    assert_eq!(events, expected_events);
}

#[test]
fn test_resumability_at_every_two_way_split() {
    let parser = StreamingParser::default();
    let (expected_output, expected_events) = parser.parse_complete(TRANSCRIPT);

    for cut in boundaries(TRANSCRIPT) {
        let (output, events) = parse_in_chunks(&parser, TRANSCRIPT, &[cut]);
        assert_eq!(output, expected_output, "split at {}", cut);
        assert_eq!(events, expected_events, "split at {}", cut);
    }
}

#[test]
fn test_resumability_char_by_char() {
    let parser = StreamingParser::default();
    let (expected_output, expected_events) = parser.parse_complete(TRANSCRIPT);

    let cuts = boundaries(TRANSCRIPT);
    let (output, events) = parse_in_chunks(&parser, TRANSCRIPT, &cuts);
    assert_eq!(output, expected_output);
    assert_eq!(events, expected_events);
}

#[test]
fn test_transcript_content() {
    let parser = StreamingParser::default();
    let (output, events) = parser.parse_complete(TRANSCRIPT);

    assert_eq!(
        output,
        "I'll set up a Vite app for you.\n\n\n\nOpen the preview once the server is up. Use <b>Ctrl+C</b> to stop it."
    );

    let actions = closed(&events);
    assert_eq!(actions.len(), 5);
    assert_eq!(
        actions[0].content,
        "{\n  \"name\": \"demo\",\n  \"scripts\": { \"dev\": \"vite\" }\n}"
    );
    assert_eq!(
        actions[1].content,
        "const el = document.querySelector<HTMLDivElement>('#app');\nif (el) el.innerHTML = `<h1>Hi</h1>`;"
    );
    assert!(matches!(actions[2].kind, PartialKind::Opaque { .. }));
    assert_eq!(actions[3].content, "npm install");
    assert_eq!(
        actions[4].kind,
        PartialKind::Shell {
            kind_hint: Some(CommandKind::Start)
        }
    );

    let ids: Vec<_> = actions.iter().map(|a| a.id).collect();
    assert_eq!(ids, vec![0, 1, 2, 3, 4]);
}

#[test]
fn test_scenario_e_unknown_type_then_shell() {
    let parser = StreamingParser::default();
    let input = r#"<artifact id="e" title="E"><action type="unknown">x</action><action type="shell">echo hi</action></artifact>"#;
    let (_, events) = parser.parse_complete(input);

    let actions = closed(&events);
    assert_eq!(actions.len(), 2);
    assert!(actions[0].to_action().is_none());
    assert_eq!(actions[1].content, "echo hi");
    assert!(matches!(events.last(), Some(ParserEvent::ArtifactClose { .. })));
}

#[test]
fn test_cursor_is_monotonic_across_transcript() {
    let parser = StreamingParser::default();
    let mut store = ParserStore::new();
    let mut events = Vec::new();
    let mut previous = 0;

    for end in boundaries(TRANSCRIPT) {
        parser.parse(&mut store, "m", &TRANSCRIPT[..end], &mut events);
        let cursor = store.get("m").unwrap().cursor();
        assert!(cursor >= previous, "cursor went from {} to {}", previous, cursor);
        assert!(cursor <= end);
        previous = cursor;
    }
}

#[test]
fn test_artifact_close_at_same_offset_wins_over_nothing() {
    let parser = StreamingParser::default();
    let (_, events) = parser.parse_complete(r#"<artifact id="x"></artifact><action type="shell">ls</action>"#);
    let names: Vec<_> = events.iter().map(|e| e.name()).collect();
    assert_eq!(names, vec!["artifact_open", "artifact_close"]);
}

#[test]
fn test_action_before_close_is_opened_first() {
    let parser = StreamingParser::default();
    let (_, events) = parser.parse_complete(
        r#"<artifact id="x"><action type="shell">ls</action></artifact><artifact id="y"></artifact>"#,
    );
    let names: Vec<_> = events.iter().map(|e| e.name()).collect();
    assert_eq!(
        names,
        vec![
            "artifact_open",
            "action_open",
            "action_close",
            "artifact_close",
            "artifact_open",
            "artifact_close"
        ]
    );
}

#[test]
fn test_stripped_content_is_stable_under_restripping() {
    let parser = StreamingParser::default();
    let (_, events) = parser.parse_complete(TRANSCRIPT);
    for action in closed(&events).iter().filter(|a| a.is_file()) {
        assert_eq!(strip_code_fences(&action.content), action.content);
    }
}

#[test]
fn test_reset_discards_in_flight_streams() {
    let parser = StreamingParser::default();
    let mut store = ParserStore::new();
    let mut events = Vec::new();

    parser.parse(&mut store, "m", "<artifact id=\"a\"><action type=\"shell\">np", &mut events);
    assert!(store.get("m").unwrap().inside_action());

    store.reset();
    assert!(store.is_empty());

    events.clear();
    let output = parser.parse(&mut store, "m", "fresh text", &mut events);
    assert_eq!(output, "fresh text");
    assert!(events.is_empty());
}
