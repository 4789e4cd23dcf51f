//! Knowledge-graph export: deterministic GraphML 1.2 and JSON renderings of
//! the claim graph, sharing one sort-by-id ordering so both formats are
//! stable across runs.

use crate::claim::{Claim, RelationKind};

fn xml_escape(input: &str) -> String {
    input
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

fn relation_label(kind: RelationKind) -> &'static str {
    match kind {
        RelationKind::Supports => "supports",
        RelationKind::Contradicts => "contradicts",
        RelationKind::Refines => "refines",
        RelationKind::Cites => "cites",
    }
}

/// Renders GraphML 1.2 with extension attributes `claim.kind`,
/// `claim.confidence`, `claim.audit_status`, sorted by claim id for
/// byte-stable output.
pub fn to_graphml(claims: &[Claim]) -> String {
    let mut sorted: Vec<&Claim> = claims.iter().collect();
    sorted.sort_by_key(|c| c.id);

    let mut out = String::new();
    out.push_str("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
    out.push_str("<graphml xmlns=\"http://graphml.graphdrawing.org/xmlns\">\n");
    out.push_str("  <key id=\"d0\" for=\"node\" attr.name=\"claim.kind\" attr.type=\"string\"/>\n");
    out.push_str("  <key id=\"d1\" for=\"node\" attr.name=\"claim.confidence\" attr.type=\"double\"/>\n");
    out.push_str("  <key id=\"d2\" for=\"node\" attr.name=\"claim.audit_status\" attr.type=\"string\"/>\n");
    out.push_str("  <graph id=\"claims\" edgedefault=\"directed\">\n");

    for claim in &sorted {
        out.push_str(&format!("    <node id=\"{}\">\n", claim.id));
        out.push_str(&format!(
            "      <data key=\"d0\">{}</data>\n",
            xml_escape(&format!("{:?}", claim.kind))
        ));
        out.push_str(&format!("      <data key=\"d1\">{}</data>\n", claim.confidence));
        out.push_str(&format!(
            "      <data key=\"d2\">{}</data>\n",
            xml_escape(&format!("{:?}", claim.audit_status))
        ));
        out.push_str("    </node>\n");
    }

    let mut edge_id = 0usize;
    for claim in &sorted {
        for relation in &claim.relations {
            out.push_str(&format!(
                "    <edge id=\"e{edge_id}\" source=\"{}\" target=\"{}\" kind=\"{}\"/>\n",
                claim.id,
                relation.target,
                relation_label(relation.kind)
            ));
            edge_id += 1;
        }
    }

    out.push_str("  </graph>\n");
    out.push_str("</graphml>\n");
    out
}

/// Renders the JSON schema:
/// `{nodes:[{id,text,kind,confidence,audit_status,sources:[...]}],
/// edges:[{src,dst,kind}]}`, UTF-8 with sorted keys and stable `id` ordering.
pub fn to_json(claims: &[Claim]) -> serde_json::Result<String> {
    use serde_json::json;

    let mut sorted: Vec<&Claim> = claims.iter().collect();
    sorted.sort_by_key(|c| c.id);

    let nodes: Vec<_> = sorted
        .iter()
        .map(|c| {
            json!({
                "id": c.id.to_string(),
                "text": c.text,
                "kind": format!("{:?}", c.kind).to_lowercase(),
                "confidence": c.confidence,
                "audit_status": format!("{:?}", c.audit_status).to_lowercase(),
                "sources": c.sources.iter().map(|s| json!({
                    "url": s.url,
                    "backend": s.backend,
                    "credibility": s.credibility,
                })).collect::<Vec<_>>(),
            })
        })
        .collect();

    let mut edges = Vec::new();
    for claim in &sorted {
        for relation in &claim.relations {
            edges.push(json!({
                "src": claim.id.to_string(),
                "dst": relation.target.to_string(),
                "kind": relation_label(relation.kind),
            }));
        }
    }

    serde_json::to_string_pretty(&json!({ "nodes": nodes, "edges": edges }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::claim::{Claim, ClaimKind};

    #[test]
    fn graphml_export_contains_claim_attributes() {
        let claim = Claim::new("alpha", ClaimKind::Thesis);
        let xml = to_graphml(&[claim]);
        assert!(xml.contains("claim.kind"));
        assert!(xml.contains("<graphml"));
    }

    #[test]
    fn json_export_is_sorted_by_id() {
        let mut a = Claim::new("a", ClaimKind::Thesis);
        let mut b = Claim::new("b", ClaimKind::Thesis);
        if a.id.0 > b.id.0 {
            std::mem::swap(&mut a, &mut b);
        }
        let json = to_json(&[b.clone(), a.clone()]).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();
        let nodes = parsed["nodes"].as_array().unwrap();
        assert_eq!(nodes[0]["id"], a.id.to_string());
        assert_eq!(nodes[1]["id"], b.id.to_string());
    }
}
