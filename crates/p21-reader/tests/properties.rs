//! Property tests: record order, comments and text escaping do not change
//! what is read.

use std::collections::BTreeSet;

use p21_reader::{read_from_buffer, DiagnosticKind, Graph, Parameter};
use proptest::prelude::*;

const TYPES: &[&str] = &["CARTESIAN_POINT", "DIRECTION", "VERTEX_POINT", "EDGE_CURVE"];

#[derive(Debug, Clone)]
struct Record {
    id: u64,
    type_name: &'static str,
    value: i64,
    refs: Vec<u64>,
}

fn records_strategy() -> impl Strategy<Value = Vec<Record>> {
    prop::collection::vec(
        (
            0..TYPES.len(),
            -1000i64..1000,
            prop::collection::vec(1u64..=24, 0..4),
        ),
        1..16,
    )
    .prop_map(|raw| {
        raw.into_iter()
            .enumerate()
            .map(|(i, (t, value, refs))| Record {
                id: i as u64 + 1,
                type_name: TYPES[t],
                value,
                refs,
            })
            .collect()
    })
}

fn render(records: &[Record], comments: bool) -> String {
    let c = if comments { "/* note */" } else { "" };
    let mut out = String::from("ISO-10303-21;\nHEADER;\nENDSEC;\nDATA;\n");
    for r in records {
        let refs: Vec<String> = r.refs.iter().map(|id| format!("#{id}")).collect();
        out.push_str(&format!(
            "#{id}{c}={c}{ty}{c}({c}'r{id}'{c},{c}{value}{c},{c}({refs}){c}){c};\n",
            id = r.id,
            ty = r.type_name,
            value = r.value,
            refs = refs.join(&format!("{c},{c}")),
        ));
    }
    out.push_str(&format!("ENDSEC;\nEND-ISO-10303-21{c};\n"));
    out
}

/// Graph content without file positions.
fn content(graph: &Graph) -> Vec<(u64, Vec<String>, Vec<Parameter>)> {
    graph
        .entities
        .values()
        .map(|e| (e.id, e.type_names.clone(), e.parameters.clone()))
        .collect()
}

fn dangling(diags: &[p21_reader::Diagnostic]) -> BTreeSet<(u64, u64)> {
    diags
        .iter()
        .filter_map(|d| match d.kind {
            DiagnosticKind::DanglingReference { from, to } => Some((from, to)),
            _ => None,
        })
        .collect()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    #[test]
    fn record_order_does_not_matter(
        (records, shuffled) in records_strategy()
            .prop_flat_map(|r| (Just(r.clone()), Just(r).prop_shuffle()))
    ) {
        let (a, diags_a) = read_from_buffer(render(&records, false).as_bytes());
        let (b, diags_b) = read_from_buffer(render(&shuffled, false).as_bytes());
        prop_assert_eq!(content(&a), content(&b));
        prop_assert_eq!(dangling(&diags_a), dangling(&diags_b));
        prop_assert_eq!(diags_a.len(), diags_b.len());
    }

    #[test]
    fn comments_are_transparent(records in records_strategy()) {
        let (plain, plain_diags) = read_from_buffer(render(&records, false).as_bytes());
        let (commented, commented_diags) = read_from_buffer(render(&records, true).as_bytes());
        prop_assert_eq!(content(&plain), content(&commented));
        let kinds = |d: &[p21_reader::Diagnostic]| d.iter().map(|d| d.kind.clone()).collect::<Vec<_>>();
        prop_assert_eq!(kinds(&plain_diags[..]), kinds(&commented_diags[..]));
    }

    #[test]
    fn reading_twice_gives_the_same_result(records in records_strategy()) {
        let input = render(&records, true);
        prop_assert_eq!(read_from_buffer(input.as_bytes()), read_from_buffer(input.as_bytes()));
    }

    #[test]
    fn escaped_text_survives(text in "[a-zA-Z0-9 ,;()'/*]{0,24}") {
        let escaped = text.replace('\'', "''");
        let input = format!(
            "ISO-10303-21;\nHEADER;\nENDSEC;\nDATA;\n#1 = LABEL('{escaped}');\nENDSEC;\nEND-ISO-10303-21;\n"
        );
        let (graph, diags) = read_from_buffer(input.as_bytes());
        prop_assert!(diags.is_empty(), "{:?}", diags);
        let label = graph.get(1).and_then(|e| e.parameters[0].as_text().map(str::to_string));
        prop_assert_eq!(label, Some(text));
    }
}
