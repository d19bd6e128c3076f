use anyhow::{anyhow, Context};
use quick_xml::events::{BytesDecl, BytesStart, Event};
use quick_xml::Reader;

/// One lexical item of an XML part, in document order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum XmlEvent {
    Decl {
        version: String,
        encoding: Option<String>,
        standalone: Option<String>,
    },
    Start {
        name: String,
        attrs: Vec<(String, String)>,
    },
    End {
        name: String,
    },
    Empty {
        name: String,
        attrs: Vec<(String, String)>,
    },
    Text {
        text: String,
    },
    CData {
        text: String,
    },
    Comment {
        text: String,
    },
    PI {
        content: String,
    },
    DocType {
        text: String,
    },
}

#[derive(Clone, Debug)]
pub struct XmlPart {
    pub name: String,
    pub events: Vec<XmlEvent>,
}

/// Reads a part into its event stream. Whitespace text is kept so that a
/// rewrite reproduces the original spacing.
pub fn parse_xml_part(name: &str, xml_bytes: &[u8]) -> anyhow::Result<XmlPart> {
    let mut reader = Reader::from_reader(xml_bytes);
    reader.config_mut().trim_text(false);

    let mut events = Vec::new();
    let mut saw_root = false;
    let mut buf = Vec::new();
    loop {
        buf.clear();
        let pos = reader.buffer_position();
        let ev = reader
            .read_event_into(&mut buf)
            .with_context(|| format!("{name}: malformed xml near byte {pos}"))?;
        let Some(ev) = convert_event(ev).with_context(|| format!("{name}: near byte {pos}"))?
        else {
            break;
        };
        saw_root |= matches!(ev, XmlEvent::Start { .. } | XmlEvent::Empty { .. });
        events.push(ev);
    }

    if !saw_root {
        return Err(anyhow!("{name}: no root element"));
    }
    Ok(XmlPart {
        name: name.to_string(),
        events,
    })
}

/// `None` at end of input.
fn convert_event(ev: Event<'_>) -> anyhow::Result<Option<XmlEvent>> {
    let out = match ev {
        Event::Eof => return Ok(None),
        Event::Decl(d) => XmlEvent::Decl {
            version: lossy(d.version().context("xml declaration version")?),
            encoding: d.encoding().and_then(|r| r.ok()).map(lossy),
            standalone: d.standalone().and_then(|r| r.ok()).map(lossy),
        },
        Event::Start(s) => XmlEvent::Start {
            name: lossy(s.name()),
            attrs: raw_attrs(&s)?,
        },
        Event::Empty(s) => XmlEvent::Empty {
            name: lossy(s.name()),
            attrs: raw_attrs(&s)?,
        },
        Event::End(e) => XmlEvent::End {
            name: lossy(e.name()),
        },
        Event::Text(t) => XmlEvent::Text {
            text: t.unescape().context("text entity")?.into_owned(),
        },
        Event::CData(t) => XmlEvent::CData {
            text: lossy(t.into_inner()),
        },
        Event::Comment(t) => XmlEvent::Comment {
            text: lossy(t.into_inner()),
        },
        Event::PI(t) => XmlEvent::PI {
            content: format!("{}{}", lossy(t.target()), lossy(t.content())),
        },
        Event::DocType(t) => XmlEvent::DocType {
            text: lossy(t.into_inner()),
        },
    };
    Ok(Some(out))
}

/// Attribute values are kept escaped so character references like `&#xD;`
/// survive a rewrite.
fn raw_attrs(s: &BytesStart<'_>) -> anyhow::Result<Vec<(String, String)>> {
    s.attributes()
        .map(|a| {
            let a = a.context("attribute")?;
            Ok((lossy(a.key), lossy(a.value)))
        })
        .collect()
}

fn lossy(bytes: impl AsRef<[u8]>) -> String {
    String::from_utf8_lossy(bytes.as_ref()).into_owned()
}

/// Compact serialization of an event stream.
pub fn write_xml_part(part: &XmlPart) -> anyhow::Result<Vec<u8>> {
    let mut out = XmlSink::default();
    for ev in &part.events {
        match ev {
            XmlEvent::Decl {
                version,
                encoding,
                standalone,
            } => {
                let decl =
                    BytesDecl::new(version.as_str(), encoding.as_deref(), standalone.as_deref());
                let mut w = quick_xml::Writer::new(Vec::new());
                w.write_event(Event::Decl(decl))
                    .with_context(|| format!("{}: xml declaration", part.name))?;
                out.raw(&w.into_inner());
            }
            XmlEvent::Start { name, attrs } => out.tag(name, attrs, false),
            XmlEvent::Empty { name, attrs } => out.tag(name, attrs, true),
            XmlEvent::End { name } => out.wrapped("</", name, ">"),
            XmlEvent::Text { text } => out.escaped(text),
            XmlEvent::CData { text } => out.wrapped("<![CDATA[", text, "]]>"),
            XmlEvent::Comment { text } => out.wrapped("<!--", text, "-->"),
            XmlEvent::PI { content } => out.wrapped("<?", content, "?>"),
            XmlEvent::DocType { text } => out.wrapped("<!DOCTYPE", text, ">"),
        }
    }
    Ok(out.0)
}

#[derive(Default)]
struct XmlSink(Vec<u8>);

impl XmlSink {
    fn raw(&mut self, bytes: &[u8]) {
        self.0.extend_from_slice(bytes);
    }

    fn wrapped(&mut self, open: &str, body: &str, close: &str) {
        self.raw(open.as_bytes());
        self.raw(body.as_bytes());
        self.raw(close.as_bytes());
    }

    fn tag(&mut self, name: &str, attrs: &[(String, String)], empty: bool) {
        self.raw(b"<");
        self.raw(name.as_bytes());
        for (k, v) in attrs {
            self.raw(b" ");
            self.raw(k.as_bytes());
            self.wrapped("=\"", v, "\"");
        }
        let close: &[u8] = if empty { b"/>" } else { b">" };
        self.raw(close);
    }

    fn escaped(&mut self, text: &str) {
        let mut last = 0;
        for (i, ch) in text.char_indices() {
            let entity: &[u8] = match ch {
                '&' => b"&amp;",
                '<' => b"&lt;",
                '>' => b"&gt;",
                _ => continue,
            };
            self.raw(text[last..i].as_bytes());
            self.raw(entity);
            last = i + 1;
        }
        self.raw(text[last..].as_bytes());
    }
}

pub fn find_attr<'a>(attrs: &'a [(String, String)], key: &str) -> Option<&'a str> {
    attrs
        .iter()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.as_str())
}
