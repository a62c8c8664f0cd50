//! End-to-end behaviour of the reader through the public API.

use approx::assert_relative_eq;
use p21_reader::{
    has_structural_errors, read_from_buffer, DiagnosticKind, EntityArgs, Parameter, Reader,
    ReaderOptions, Resolution,
};

fn wrap(data: &str) -> String {
    format!(
        "ISO-10303-21;\nHEADER;\nFILE_DESCRIPTION(('test'), '2;1');\nENDSEC;\nDATA;\n{data}\nENDSEC;\nEND-ISO-10303-21;\n"
    )
}

fn errors(diags: &[p21_reader::Diagnostic]) -> usize {
    diags.iter().filter(|d| d.is_error()).count()
}

#[test]
fn forward_reference_resolves() {
    let (graph, diags) = read_from_buffer(wrap("#1 = LINE('', #2, #3);\n#2 = POINT();\n#3 = VECTOR();").as_bytes());
    assert!(diags.is_empty(), "{diags:?}");
    let line = graph.get(1).unwrap();
    for p in &line.parameters[1..] {
        match p {
            Parameter::Reference(r) => {
                assert_eq!(r.resolution, Resolution::Resolved);
                assert!(graph.resolve(r).is_some());
            }
            other => panic!("expected reference, got {other:?}"),
        }
    }
}

#[test]
fn dangling_reference_reported_once() {
    let (graph, diags) = read_from_buffer(wrap("#1 = A(#3, (#3, #3));\n#2 = B(#1);").as_bytes());
    assert_eq!(diags.len(), 1);
    assert_eq!(diags[0].kind, DiagnosticKind::DanglingReference { from: 1, to: 3 });
    assert!(diags[0].message().contains("#3"));
    assert!(graph.get(1).is_some());
    assert!(!has_structural_errors(&diags));
}

#[test]
fn malformed_record_does_not_stop_parsing() {
    let input = wrap("#1 = A(1.0;\n#2 = B(2);\n#3 = C('x', #2);");
    let (graph, diags) = read_from_buffer(input.as_bytes());
    assert_eq!(errors(&diags), 1);
    assert!(graph.get(1).is_none());
    assert_eq!(graph.get(2).unwrap().integer(0).unwrap(), 2);
    assert_eq!(graph.get(3).unwrap().reference(1).unwrap(), 2);
    assert!(has_structural_errors(&diags));
}

#[test]
fn duplicate_id_keeps_first_definition() {
    let (graph, diags) = read_from_buffer(wrap("#5 = FIRST();\n#5 = SECOND();").as_bytes());
    assert_eq!(diags.len(), 1);
    assert_eq!(
        diags[0].kind,
        DiagnosticKind::DuplicateId { id: 5, first_line: 6 }
    );
    assert_eq!(diags[0].line(), 7);
    assert_eq!(graph.get(5).unwrap().type_name(), "FIRST");
}

#[test]
fn reading_is_idempotent() {
    let input = wrap("#1 = A(#2, 'x', .T.);\n#2 = B((1, 2.5), $, *);\n#3 = C(#99);");
    let first = read_from_buffer(input.as_bytes());
    let second = read_from_buffer(input.as_bytes());
    assert_eq!(first, second);
}

#[test]
fn doubled_quotes_are_one_quote() {
    let (graph, diags) = read_from_buffer(wrap("#1 = LABEL('ab''cd');").as_bytes());
    assert!(diags.is_empty());
    assert_eq!(graph.get(1).unwrap().text(0).unwrap(), "ab'cd");
}

#[test]
fn multiline_text_keeps_line_numbers() {
    let input = wrap("#1 = NOTE('first\nsecond\nthird');\n#2 = NEXT();");
    let (graph, diags) = read_from_buffer(input.as_bytes());
    assert!(diags.is_empty());
    assert_eq!(graph.get(1).unwrap().text(0).unwrap(), "first\nsecond\nthird");
    assert_eq!(graph.get(1).unwrap().line, 6);
    assert_eq!(graph.get(2).unwrap().line, 9);
}

#[test]
fn complex_instance() {
    let input = wrap(
        "#1 = (GEOMETRIC_REPRESENTATION_CONTEXT(3) GLOBAL_UNIT_ASSIGNED_CONTEXT((#2)) REPRESENTATION_CONTEXT('', ''));\n#2 = (LENGTH_UNIT() NAMED_UNIT(*) SI_UNIT(.MILLI., .METRE.));",
    );
    let (graph, diags) = read_from_buffer(input.as_bytes());
    assert!(diags.is_empty(), "{diags:?}");
    let ctx = graph.get(1).unwrap();
    assert!(ctx.is_complex());
    assert_eq!(ctx.partial("GEOMETRIC_REPRESENTATION_CONTEXT"), Some(&[Parameter::Integer(3)][..]));
    assert_eq!(graph.entities_of_type("SI_UNIT").len(), 1);
    assert_eq!(graph.referrers(2), vec![1]);
    assert_eq!(graph.stats().complex_entities, 2);
}

#[test]
fn header_and_schema() {
    let input = "ISO-10303-21;\nHEADER;\nFILE_DESCRIPTION(('part'), '2;1');\nFILE_NAME('part.stp', '2024-01-01T00:00:00', ('me'), (''), '', '', '');\nFILE_SCHEMA(('CONFIG_CONTROL_DESIGN'));\nENDSEC;\nDATA;\nENDSEC;\nEND-ISO-10303-21;\n";
    let (graph, diags) = read_from_buffer(input.as_bytes());
    assert!(diags.is_empty());
    assert_eq!(graph.header.len(), 3);
    assert_eq!(graph.schema_names(), vec!["CONFIG_CONTROL_DESIGN"]);
    assert_eq!(
        graph.header_entity("FILE_NAME").unwrap().parameters[0].as_text(),
        Some("part.stp")
    );
    assert!(graph.is_empty());
}

#[test]
fn numbers_and_literals() {
    let (graph, diags) = read_from_buffer(
        wrap("#1 = CARTESIAN_POINT('', (0., -1.5E-3, 1.E2));\n#2 = FLAGS(.T., .F., \"0FF\", $, *);").as_bytes(),
    );
    assert!(diags.is_empty(), "{diags:?}");
    let coords = graph.get(1).unwrap().real_list(1).unwrap();
    assert_relative_eq!(coords[0], 0.0);
    assert_relative_eq!(coords[1], -1.5e-3);
    assert_relative_eq!(coords[2], 100.0);

    let flags = graph.get(2).unwrap();
    assert_eq!(flags.parameters[0].as_bool(), Some(true));
    assert_eq!(flags.parameters[1].as_bool(), Some(false));
    assert_eq!(flags.parameters[2], Parameter::Binary("0FF".into()));
    assert!(flags.is_void(3));
    assert!(flags.parameters[4].is_derived());
}

#[test]
fn text_control_directives_are_decoded() {
    let input = wrap("#1 = NAME('\\X2\\00C4\\X0\\rger', 'caf\\X\\E9');");
    let (graph, diags) = read_from_buffer(input.as_bytes());
    assert!(diags.is_empty());
    let e = graph.get(1).unwrap();
    assert_eq!(e.text(0).unwrap(), "\u{c4}rger");
    assert_eq!(e.text(1).unwrap(), "caf\u{e9}");

    let raw = Reader::new(ReaderOptions {
        decode_text: false,
        ..ReaderOptions::default()
    })
    .unwrap();
    let (graph, _) = raw.read_bytes(input.as_bytes());
    assert_eq!(graph.get(1).unwrap().text(1).unwrap(), "caf\\X\\E9");
}

#[test]
fn content_after_end_is_ignored() {
    let mut input = wrap("#1 = A();");
    input.push_str("garbage that is not part of the file ' #\n");
    let (graph, diags) = read_from_buffer(input.as_bytes());
    assert!(diags.is_empty());
    assert_eq!(graph.len(), 1);
}

#[test]
fn comment_before_final_terminator() {
    let input = wrap("#1 = A();").replace("END-ISO-10303-21;", "END-ISO-10303-21 /* signed */;");
    let (graph, diags) = read_from_buffer(input.as_bytes());
    assert!(diags.is_empty(), "{diags:?}");
    assert!(!has_structural_errors(&diags));
    assert_eq!(graph.len(), 1);
}

#[test]
fn deeply_nested_list_is_reported_not_fatal() {
    let depth = 5000;
    let input = wrap(&format!(
        "#1 = A({}1{});\n#2 = B(#1);",
        "(".repeat(depth),
        ")".repeat(depth)
    ));
    let (graph, diags) = read_from_buffer(input.as_bytes());
    assert!(graph.get(1).is_none());
    assert!(graph.get(2).is_some());
    assert!(diags
        .iter()
        .any(|d| matches!(d.kind, DiagnosticKind::NestingTooDeep { entity: Some(1), .. })));
    assert!(diags
        .iter()
        .any(|d| d.kind == DiagnosticKind::DanglingReference { from: 2, to: 1 }));
}

#[test]
fn scoped_entities() {
    let input = wrap(
        "#10 = &SCOPE\n#11 = POINT();\n#12 = POINT();\nENDSCOPE /#11/ SHAPE(#11, #12);\n#20 = USER(#11);\n#21 = SNOOP(#12);",
    );
    let (graph, diags) = read_from_buffer(input.as_bytes());
    assert_eq!(graph.len(), 5);
    assert_eq!(graph.scopes.len(), 1);
    assert_eq!(graph.scopes[0].owner, Some(10));
    assert_eq!(graph.scopes[0].exports, vec![11]);
    assert_eq!(
        diags.iter().map(|d| &d.kind).collect::<Vec<_>>(),
        vec![&DiagnosticKind::HiddenReference { from: 21, to: 12 }]
    );
    assert!(!has_structural_errors(&diags));
}

#[test]
fn truncated_file_keeps_partial_graph() {
    let input = "ISO-10303-21;\nHEADER;\nENDSEC;\nDATA;\n#1 = A();\n#2 = B(#1);\n#3 = C(";
    let (graph, diags) = read_from_buffer(input.as_bytes());
    assert_eq!(graph.len(), 2);
    assert_eq!(errors(&diags), 1);
    assert!(matches!(diags[0].kind, DiagnosticKind::UnexpectedEof { .. }));
}

#[test]
fn error_budget_from_toml() {
    let options = ReaderOptions::from_toml_str("max_errors = 1").unwrap();
    let reader = Reader::new(options).unwrap();
    let (graph, diags) = reader.read_bytes(wrap("#1 = A(,);\n#2 = B();").as_bytes());
    assert!(graph.is_empty());
    assert!(diags
        .iter()
        .any(|d| matches!(d.kind, DiagnosticKind::TooManyErrors { limit: 1 })));
}

#[test]
fn graph_serializes_to_json() {
    let (graph, diags) = read_from_buffer(wrap("#1 = A(#2, 1.5);\n#2 = B();").as_bytes());
    let json = serde_json::to_value(&graph).unwrap();
    assert_eq!(json["entities"]["1"]["type_names"][0], "A");
    assert_eq!(json["entities"]["1"]["parameters"][0]["type"], "reference");
    assert_eq!(json["entities"]["1"]["parameters"][0]["value"]["resolution"], "resolved");
    assert!(serde_json::to_value(&diags).unwrap().as_array().unwrap().is_empty());
}
