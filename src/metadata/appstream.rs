//! AppStream metainfo extraction
//!
//! Only untranslated children of the root component are read. Elements
//! carrying `xml:lang` are skipped along with everything inside them, and
//! nested blocks such as `<developer>` or `<release>` never leak their own
//! `<name>` or `<description>` into the package header.

use std::path::Path;

use quick_xml::events::{BytesStart, BytesText, Event};
use quick_xml::Reader;

use crate::error::Result;

/// Fields read from an AppStream metainfo file
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AppStreamInfo {
    /// Component id, e.g. `org.example.Foo`
    pub id: Option<String>,
    /// Untranslated name
    pub name: Option<String>,
    /// Untranslated summary
    pub summary: Option<String>,
    /// Plain text description, paragraphs separated by blank lines
    pub description: Option<String>,
    /// SPDX license expression of the project
    pub license: Option<String>,
    /// Homepage URL
    pub homepage: Option<String>,
    /// Version of the first listed release
    pub version: Option<String>,
    /// Desktop categories
    pub categories: Vec<String>,
}

/// Top level element whose text is being collected
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    Id,
    Name,
    Summary,
    License,
    Homepage,
    Category,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BlockKind {
    Paragraph,
    Item,
}

/// `<p>` blocks become paragraphs, `<li>` items become `- item` lines
#[derive(Debug, Default)]
struct Description {
    blocks: Vec<(BlockKind, String)>,
    open: Option<(BlockKind, String)>,
    loose: String,
}

impl Description {
    fn start(&mut self, kind: BlockKind) {
        self.flush();
        self.open = Some((kind, String::new()));
    }

    fn push(&mut self, text: &str) {
        match &mut self.open {
            Some((_, buf)) => buf.push_str(text),
            None => self.loose.push_str(text),
        }
    }

    fn flush(&mut self) {
        if let Some((kind, buf)) = self.open.take() {
            let text = collapse(&buf);
            if !text.is_empty() {
                self.blocks.push((kind, text));
            }
        }
    }

    fn finish(mut self) -> Option<String> {
        self.flush();
        if self.blocks.is_empty() {
            return Some(collapse(&self.loose)).filter(|s| !s.is_empty());
        }

        let mut paragraphs: Vec<String> = Vec::new();
        let mut in_list = false;
        for (kind, text) in self.blocks {
            match kind {
                BlockKind::Item => {
                    let item = format!("- {}", text);
                    match paragraphs.last_mut() {
                        Some(last) if in_list => {
                            last.push('\n');
                            last.push_str(&item);
                        }
                        _ => paragraphs.push(item),
                    }
                    in_list = true;
                }
                BlockKind::Paragraph => {
                    paragraphs.push(text);
                    in_list = false;
                }
            }
        }
        Some(paragraphs.join("\n\n"))
    }
}

impl AppStreamInfo {
    /// Parse metainfo XML text
    pub fn parse(xml: &str) -> Result<Self> {
        let mut reader = Reader::from_str(xml);
        let mut info = Self::default();

        // Local names of the open elements, root first
        let mut path: Vec<Vec<u8>> = Vec::new();
        // Depth at which a translated element was entered
        let mut skip_from: Option<usize> = None;
        let mut field: Option<(Field, String)> = None;
        let mut description: Option<Description> = None;
        let mut seen_description = false;

        loop {
            match reader.read_event()? {
                Event::Start(e) => {
                    let name = e.local_name().as_ref().to_vec();
                    path.push(name);
                    if skip_from.is_some() {
                        continue;
                    }
                    if is_translated(&e)? {
                        skip_from = Some(path.len());
                        continue;
                    }
                    on_start(
                        &e,
                        &path,
                        &mut info,
                        &mut field,
                        &mut description,
                        seen_description,
                    )?;
                }
                Event::Empty(e) => {
                    if skip_from.is_none() && path.len() == 2 && path[1] == b"releases" {
                        release_version(&e, &mut info)?;
                    }
                }
                Event::Text(t) => {
                    if skip_from.is_none() {
                        collect(&text(&t), &mut field, &mut description);
                    }
                }
                Event::CData(c) => {
                    if skip_from.is_none() {
                        collect(&String::from_utf8_lossy(&c), &mut field, &mut description);
                    }
                }
                Event::End(_) => {
                    let depth = path.len();
                    let name = path.pop().unwrap_or_default();
                    match skip_from {
                        Some(from) if depth > from => continue,
                        Some(_) => {
                            skip_from = None;
                            continue;
                        }
                        None => {}
                    }
                    on_end(
                        &name,
                        depth,
                        &mut info,
                        &mut field,
                        &mut description,
                        &mut seen_description,
                    );
                }
                Event::Eof => break,
                _ => {}
            }
        }

        Ok(info)
    }

    /// Read and parse a metainfo file
    pub fn load(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path)?;
        Self::parse(&String::from_utf8_lossy(&bytes))
    }
}

fn on_start(
    e: &BytesStart<'_>,
    path: &[Vec<u8>],
    info: &mut AppStreamInfo,
    field: &mut Option<(Field, String)>,
    description: &mut Option<Description>,
    seen_description: bool,
) -> Result<()> {
    let name = path.last().map(Vec::as_slice).unwrap_or_default();
    match path.len() {
        2 => {
            let homepage = name == b"url" && attribute(e, b"type")?.as_deref() == Some("homepage");
            let started = match name {
                b"id" => Some(Field::Id),
                b"name" => Some(Field::Name),
                b"summary" => Some(Field::Summary),
                b"project_license" => Some(Field::License),
                b"url" if homepage => Some(Field::Homepage),
                b"description" if !seen_description => {
                    *description = Some(Description::default());
                    None
                }
                _ => None,
            };
            if let Some(started) = started {
                *field = Some((started, String::new()));
            }
        }
        3 if path[1] == b"categories" && name == b"category" => {
            *field = Some((Field::Category, String::new()));
        }
        3 if path[1] == b"releases" && name == b"release" => {
            release_version(e, info)?;
        }
        _ => {}
    }

    if let Some(desc) = description {
        match name {
            b"p" => desc.start(BlockKind::Paragraph),
            b"li" => desc.start(BlockKind::Item),
            _ => {}
        }
    }
    Ok(())
}

fn on_end(
    name: &[u8],
    depth: usize,
    info: &mut AppStreamInfo,
    field: &mut Option<(Field, String)>,
    description: &mut Option<Description>,
    seen_description: &mut bool,
) {
    if depth == 2 && name == b"description" {
        if let Some(desc) = description.take() {
            info.description = desc.finish();
            *seen_description = true;
        }
        return;
    }
    if let Some(desc) = description {
        if matches!(name, b"p" | b"li") {
            desc.flush();
        }
        return;
    }

    let closes = match field {
        Some((Field::Category, _)) => depth == 3,
        Some(_) => depth == 2,
        None => false,
    };
    if !closes {
        return;
    }
    let Some((kind, buf)) = field.take() else {
        return;
    };
    let value = Some(collapse(&buf)).filter(|v| !v.is_empty());
    let slot = match kind {
        Field::Id => &mut info.id,
        Field::Name => &mut info.name,
        Field::Summary => &mut info.summary,
        Field::License => &mut info.license,
        Field::Homepage => &mut info.homepage,
        Field::Category => {
            info.categories.extend(value);
            return;
        }
    };
    if slot.is_none() {
        *slot = value;
    }
}

fn collect(text: &str, field: &mut Option<(Field, String)>, description: &mut Option<Description>) {
    if let Some(desc) = description {
        desc.push(text);
    } else if let Some((_, buf)) = field {
        buf.push_str(text);
    }
}

/// Unescaped text; unknown entities keep their raw form
fn text(t: &BytesText<'_>) -> String {
    match t.unescape() {
        Ok(text) => text.into_owned(),
        Err(_) => String::from_utf8_lossy(t).into_owned(),
    }
}

fn is_translated(e: &BytesStart<'_>) -> Result<bool> {
    Ok(attribute(e, b"xml:lang")?.is_some_and(|lang| !lang.is_empty()))
}

fn attribute(e: &BytesStart<'_>, key: &[u8]) -> Result<Option<String>> {
    for attr in e.attributes() {
        let attr = attr.map_err(quick_xml::Error::from)?;
        if attr.key.as_ref() == key {
            return Ok(Some(attr.unescape_value()?.trim().to_string()));
        }
    }
    Ok(None)
}

fn release_version(e: &BytesStart<'_>, info: &mut AppStreamInfo) -> Result<()> {
    if info.version.is_none() && e.local_name().as_ref() == b"release" {
        info.version = attribute(e, b"version")?.filter(|v| !v.is_empty());
    }
    Ok(())
}

fn collapse(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<component type="desktop-application">
  <id>org.example.Foo</id>
  <metadata_license>CC0-1.0</metadata_license>
  <project_license>GPL-3.0-or-later</project_license>
  <name xml:lang="de">Fuu</name>
  <name>Foo</name>
  <summary>Edit foo &amp; bar files</summary>
  <developer id="org.example"><name>Example Inc.</name></developer>
  <description>
    <p>Foo is an <em>editor</em>.</p>
    <p xml:lang="de">Foo ist ein Editor.</p>
    <ul>
      <li>Fast</li>
      <li>Small</li>
    </ul>
  </description>
  <url type="homepage">https://example.org/foo</url>
  <categories><category>Development</category></categories>
  <releases>
    <release version="2.4.0" date="2024-01-01"><description><p>New</p></description></release>
    <release version="2.3.0" date="2023-06-01"/>
  </releases>
</component>
"#;

    #[test]
    fn test_parse_fields() {
        let info = AppStreamInfo::parse(SAMPLE).unwrap();
        assert_eq!(info.id.as_deref(), Some("org.example.Foo"));
        assert_eq!(info.name.as_deref(), Some("Foo"));
        assert_eq!(info.summary.as_deref(), Some("Edit foo & bar files"));
        assert_eq!(info.license.as_deref(), Some("GPL-3.0-or-later"));
        assert_eq!(info.homepage.as_deref(), Some("https://example.org/foo"));
        assert_eq!(info.version.as_deref(), Some("2.4.0"));
        assert_eq!(info.categories, vec!["Development"]);
    }

    #[test]
    fn test_description_text() {
        let info = AppStreamInfo::parse(SAMPLE).unwrap();
        assert_eq!(
            info.description.as_deref(),
            Some("Foo is an editor.\n\n- Fast\n- Small")
        );
    }

    #[test]
    fn test_cdata_comments_and_self_closing_release() {
        let xml = r#"<component>
  <!-- <name>Commented</name> -->
  <name><![CDATA[Foo & Friends]]></name>
  <summary xml:lang="fr">Résumé</summary>
  <summary>Plain &lt;summary&gt;</summary>
  <url type="bugtracker">https://example.org/bugs</url>
  <releases><release version="0.9&#46;1"/></releases>
</component>"#;
        let info = AppStreamInfo::parse(xml).unwrap();
        assert_eq!(info.name.as_deref(), Some("Foo & Friends"));
        assert_eq!(info.summary.as_deref(), Some("Plain <summary>"));
        assert!(info.homepage.is_none());
        assert_eq!(info.version.as_deref(), Some("0.9.1"));
    }

    #[test]
    fn test_inline_markup_inside_name() {
        let info =
            AppStreamInfo::parse("<component><name>Foo <b>Pro</b> Edition</name></component>")
                .unwrap();
        assert_eq!(info.name.as_deref(), Some("Foo Pro Edition"));
    }

    #[test]
    fn test_loose_description_text() {
        let info =
            AppStreamInfo::parse("<component><description>  Just   text </description></component>")
                .unwrap();
        assert_eq!(info.description.as_deref(), Some("Just text"));
    }

    #[test]
    fn test_missing_elements() {
        let info = AppStreamInfo::parse("<component><id>x</id></component>").unwrap();
        assert_eq!(info.id.as_deref(), Some("x"));
        assert!(info.name.is_none());
        assert!(info.version.is_none());
        assert!(info.description.is_none());
    }

    #[test]
    fn test_malformed_xml_is_an_error() {
        assert!(AppStreamInfo::parse("<component><name>Foo</summary></component>").is_err());
    }
}
