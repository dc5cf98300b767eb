//! World metadata persistence: a small hand-rolled XML reader/writer for
//! `world.xml`, grounded on the original engine's own world-descriptor
//! format rather than pulling in a full XML crate for four fields.

use std::fs;
use std::path::Path;

use crate::error::WorldError;

/// The persisted facts about a world that outlive any single session:
/// its name, generation seed, on-disk format version, last-played
/// timestamp and spawn point.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorldMetadata {
    pub name: String,
    pub seed: u64,
    pub version: u32,
    pub last_played: i64,
    pub spawn: (i32, i32, i32),
}

impl WorldMetadata {
    pub fn to_xml(&self) -> String {
        format!(
            "<world>\n  <name>{}</name>\n  <seed>{}</seed>\n  <version>{}</version>\n  <last_played>{}</last_played>\n  <spawn x=\"{}\" y=\"{}\" z=\"{}\"/>\n</world>\n",
            escape(&self.name),
            self.seed,
            self.version,
            self.last_played,
            self.spawn.0,
            self.spawn.1,
            self.spawn.2,
        )
    }

    pub fn from_xml(text: &str) -> Result<Self, WorldError> {
        let name = tag_text(text, "name").ok_or_else(|| missing("name"))?;
        let seed = tag_text(text, "seed")
            .ok_or_else(|| missing("seed"))?
            .parse()
            .map_err(|_| malformed("seed"))?;
        let version = tag_text(text, "version")
            .ok_or_else(|| missing("version"))?
            .parse()
            .map_err(|_| malformed("version"))?;
        let last_played = tag_text(text, "last_played")
            .ok_or_else(|| missing("last_played"))?
            .parse()
            .map_err(|_| malformed("last_played"))?;
        let spawn_tag = find_tag(text, "spawn").ok_or_else(|| missing("spawn"))?;
        let x = attr(spawn_tag, "x").ok_or_else(|| malformed("spawn.x"))?;
        let y = attr(spawn_tag, "y").ok_or_else(|| malformed("spawn.y"))?;
        let z = attr(spawn_tag, "z").ok_or_else(|| malformed("spawn.z"))?;

        Ok(Self {
            name: unescape(&name),
            seed,
            version,
            last_played,
            spawn: (x, y, z),
        })
    }

    pub fn write_to_file(&self, path: &Path) -> Result<(), WorldError> {
        fs::write(path, self.to_xml()).map_err(|e| {
            WorldError::Codec(crate::error::CodecError::Io(e))
        })
    }

    pub fn read_from_file(path: &Path) -> Result<Self, WorldError> {
        let text = fs::read_to_string(path)
            .map_err(|e| WorldError::Codec(crate::error::CodecError::Io(e)))?;
        Self::from_xml(&text)
    }
}

fn missing(field: &str) -> WorldError {
    WorldError::Codec(crate::error::CodecError::CorruptedHeader(format!(
        "world.xml missing <{field}>"
    )))
}

fn malformed(field: &str) -> WorldError {
    WorldError::Codec(crate::error::CodecError::CorruptedHeader(format!(
        "world.xml has a malformed {field}"
    )))
}

fn find_tag<'a>(text: &'a str, name: &str) -> Option<&'a str> {
    let open = format!("<{name}");
    let start = text.find(&open)?;
    let tag_end = text[start..].find('>')? + start;
    Some(&text[start..=tag_end])
}

fn tag_text(text: &str, name: &str) -> Option<String> {
    let open = format!("<{name}>");
    let close = format!("</{name}>");
    let start = text.find(&open)? + open.len();
    let end = text[start..].find(&close)? + start;
    Some(text[start..end].trim().to_string())
}

fn attr<T: std::str::FromStr>(tag: &str, name: &str) -> Option<T> {
    let marker = format!("{name}=\"");
    let start = tag.find(&marker)? + marker.len();
    let end = tag[start..].find('"')? + start;
    tag[start..end].parse().ok()
}

fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

fn unescape(text: &str) -> String {
    text.replace("&quot;", "\"")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metadata_round_trips_through_xml_text() {
        let meta = WorldMetadata {
            name: "Test & Trial".to_string(),
            seed: 0xDEAD_BEEF_u64,
            version: 1,
            last_played: 1_700_000_000,
            spawn: (-12, 34, 70),
        };
        let xml = meta.to_xml();
        let parsed = WorldMetadata::from_xml(&xml).unwrap();
        assert_eq!(parsed, meta);
    }

    #[test]
    fn round_trips_through_an_actual_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("world.xml");
        let meta = WorldMetadata {
            name: "Overworld".to_string(),
            seed: 7,
            version: 1,
            last_played: 42,
            spawn: (0, 0, 64),
        };
        meta.write_to_file(&path).unwrap();
        let parsed = WorldMetadata::read_from_file(&path).unwrap();
        assert_eq!(parsed, meta);
    }

    #[test]
    fn missing_field_is_reported() {
        let err = WorldMetadata::from_xml("<world><name>x</name></world>");
        assert!(err.is_err());
    }
}
