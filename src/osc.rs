//! OSC (osmChange XML) emission: a stateless writer over a [`ChangeSet`]'s
//! entries, independent of any Store (§4.11).

use std::io::{self, Write};

use crate::changeset::entity::Entity;

/// Escapes the four XML-attribute metacharacters. Values that already round
/// -trip through a PBF string table may contain any of these, so this is
/// always applied rather than only on demand.
fn escape_attr(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}

fn write_tags(w: &mut dyn Write, tags: &[(String, String)]) -> io::Result<()> {
    for (k, v) in tags {
        writeln!(w, r#"    <tag k="{}" v="{}"/>"#, escape_attr(k), escape_attr(v))?;
    }
    Ok(())
}

fn write_entity(w: &mut dyn Write, entity: &Entity) -> io::Result<()> {
    match entity {
        Entity::Node(n) => {
            writeln!(w, r#"  <node id="{}" lon="{}" lat="{}">"#, n.id, n.lon, n.lat)?;
            write_tags(w, &n.tags)?;
            writeln!(w, "  </node>")
        }
        Entity::Way(way) => {
            writeln!(w, r#"  <way id="{}">"#, way.id)?;
            write_tags(w, &way.tags)?;
            for r in &way.refs {
                writeln!(w, r#"    <nd ref="{r}"/>"#)?;
            }
            writeln!(w, "  </way>")
        }
        Entity::Relation(r) => {
            writeln!(w, r#"  <relation id="{}">"#, r.id)?;
            for m in &r.members {
                let type_str = match m.member_type {
                    crate::types::EntityType::Node => "node",
                    crate::types::EntityType::Way => "way",
                    crate::types::EntityType::Relation => "relation",
                };
                writeln!(
                    w,
                    r#"    <member type="{}" ref="{}" role="{}"/>"#,
                    type_str,
                    m.member_ref,
                    escape_attr(&m.role)
                )?;
            }
            write_tags(w, &r.tags)?;
            writeln!(w, "  </relation>")
        }
    }
}

/// A single pending change, just enough to drive emission without exposing
/// `ChangeSet`'s private entry representation.
pub enum OscEntry<'a> {
    Create(&'a Entity),
    Modify(&'a Entity),
    Delete { entity_type: crate::types::EntityType, id: i64 },
}

/// Writes an `<osmChange version="0.6">` document with `<create>`,
/// `<modify>`, `<delete>` sections, in that order.
pub fn write_osc(w: &mut dyn Write, entries: &[OscEntry]) -> io::Result<()> {
    writeln!(w, r#"<osmChange version="0.6">"#)?;

    writeln!(w, "<create>")?;
    for entry in entries {
        if let OscEntry::Create(entity) = entry {
            write_entity(w, entity)?;
        }
    }
    writeln!(w, "</create>")?;

    writeln!(w, "<modify>")?;
    for entry in entries {
        if let OscEntry::Modify(entity) = entry {
            write_entity(w, entity)?;
        }
    }
    writeln!(w, "</modify>")?;

    writeln!(w, "<delete>")?;
    for entry in entries {
        if let OscEntry::Delete { entity_type, id } = entry {
            let tag = match entity_type {
                crate::types::EntityType::Node => "node",
                crate::types::EntityType::Way => "way",
                crate::types::EntityType::Relation => "relation",
            };
            writeln!(w, r#"  <{tag} id="{id}"/>"#)?;
        }
    }
    writeln!(w, "</delete>")?;

    writeln!(w, "</osmChange>")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::changeset::entity::NodeEntity;

    #[test]
    fn escapes_reserved_xml_characters() {
        assert_eq!(escape_attr(r#"a&b<c>d"e"#), "a&amp;b&lt;c&gt;d&quot;e");
    }

    #[test]
    fn writes_create_section_before_delete() {
        let node = Entity::Node(NodeEntity {
            id: 1,
            lon: 1.5,
            lat: 2.5,
            tags: vec![("name".to_string(), "caf\u{e9} & bar".to_string())],
        });
        let entries = vec![
            OscEntry::Create(&node),
            OscEntry::Delete { entity_type: crate::types::EntityType::Node, id: 99 },
        ];
        let mut buf = Vec::new();
        write_osc(&mut buf, &entries).unwrap();
        let xml = String::from_utf8(buf).unwrap();

        assert!(xml.find("<create>").unwrap() < xml.find("<delete>").unwrap());
        assert!(xml.contains("caf\u{e9} &amp; bar"));
        assert!(xml.contains(r#"<node id="99"/>"#));
    }
}
