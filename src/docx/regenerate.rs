use std::collections::{BTreeMap, HashMap};

use serde::Serialize;
use tracing::{debug, warn};

use crate::docx::extract::{cell_paragraphs, cell_text, paragraph_text};
use crate::docx::layout::scan_layout;
use crate::docx::package::DocxPackage;
use crate::docx::tree::{XmlElement, XmlNode, XmlTree};
use crate::docx::xml::{parse_xml_part, write_xml_part};
use crate::error::{DocError, Result};
use crate::ir::{Block, BlockLocator, PartName};

#[derive(Clone, Copy, Debug, Default)]
pub struct RegenerateOptions {
    /// Rewrite addressed positions even when their text is already equal.
    pub force_rewrite: bool,
}

/// An update whose coordinates do not exist in the reloaded template.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StalePositionSkip {
    pub block_id: String,
    pub reason: String,
}

#[derive(Clone, Debug, Default)]
pub struct RegenerationReport {
    pub package: Vec<u8>,
    pub applied: Vec<String>,
    pub unchanged: usize,
    pub skipped: Vec<StalePositionSkip>,
}

pub fn regenerate(template: &[u8], blocks: &[Block]) -> Result<RegenerationReport> {
    regenerate_with(template, blocks, RegenerateOptions::default())
}

pub fn regenerate_with(
    template: &[u8],
    blocks: &[Block],
    opts: RegenerateOptions,
) -> Result<RegenerationReport> {
    let pkg = DocxPackage::from_bytes(template)
        .map_err(|e| DocError::Regeneration(format!("reload template: {e}")))?;

    let mut by_part: BTreeMap<PartName, Vec<&Block>> = BTreeMap::new();
    for b in blocks {
        by_part.entry(b.part).or_default().push(b);
    }

    let mut report = RegenerationReport::default();
    let mut replacements: HashMap<String, Vec<u8>> = HashMap::new();

    for (part, mut updates) in by_part {
        // Paragraphs before cells, each in structural order.
        updates.sort_by_key(|b| (b.kind(), b.locator.sort_key()));

        let entry = part.entry_name();
        let Some(xml) = pkg.part_xml(part) else {
            for b in updates {
                report.skipped.push(stale(b, format!("{entry} not in template")));
            }
            continue;
        };
        let events = parse_xml_part(&entry, xml)
            .map_err(|e| DocError::Regeneration(format!("parse {entry}: {e:#}")))?;
        let mut tree = XmlTree::from_part(events)
            .map_err(|e| DocError::Regeneration(format!("parse {entry}: {e:#}")))?;
        let layout = scan_layout(&tree);

        let mut touched = false;
        for b in updates {
            let (path, current, rebuilt) = match b.locator {
                BlockLocator::Paragraph { index } => {
                    let Some(path) = layout.paragraph(index) else {
                        report.skipped.push(stale(
                            b,
                            format!("paragraph {index} of {}", layout.paragraphs.len()),
                        ));
                        continue;
                    };
                    let Some(p) = tree.element_at(path) else {
                        report.skipped.push(stale(b, "paragraph path".to_string()));
                        continue;
                    };
                    (path, paragraph_text(p), rebuild_paragraph(p, &b.text))
                }
                BlockLocator::TableCell {
                    table_index,
                    row,
                    col,
                } => {
                    let Some(path) = layout.cell(table_index, row, col) else {
                        report.skipped.push(stale(
                            b,
                            format!("cell ({table_index}, {row}, {col}) not in template"),
                        ));
                        continue;
                    };
                    let Some(tc) = tree.element_at(path) else {
                        report.skipped.push(stale(b, "cell path".to_string()));
                        continue;
                    };
                    (path, cell_text(tc), rebuild_cell(tc, &b.text))
                }
            };

            if current == b.text && !opts.force_rewrite {
                report.unchanged += 1;
                continue;
            }
            if !tree.replace_at(path, XmlNode::Element(rebuilt)) {
                report.skipped.push(stale(b, "path no longer resolves".to_string()));
                continue;
            }
            touched = true;
            report.applied.push(b.id.clone());
        }

        if touched {
            let bytes = write_xml_part(&tree.to_part())
                .map_err(|e| DocError::Regeneration(format!("serialize {entry}: {e:#}")))?;
            debug!(part = %part, bytes = bytes.len(), "rewrote part");
            replacements.insert(entry, bytes);
        }
    }

    for s in &report.skipped {
        warn!(block = %s.block_id, reason = %s.reason, "skipped stale block position");
    }

    report.package = pkg
        .to_bytes_with_replacements(&replacements)
        .map_err(|e| DocError::Regeneration(format!("{e:#}")))?;
    Ok(report)
}

fn stale(b: &Block, reason: String) -> StalePositionSkip {
    StalePositionSkip {
        block_id: b.id.clone(),
        reason,
    }
}

/// First run properties found in the paragraph, outside its `w:pPr`.
fn first_run_properties(el: &XmlElement) -> Option<XmlElement> {
    for child in el.child_elements() {
        match child.name.as_str() {
            "w:pPr" => {}
            "w:r" => {
                if let Some(rpr) = child.child("w:rPr") {
                    return Some(rpr.clone());
                }
            }
            _ => {
                if let Some(rpr) = first_run_properties(child) {
                    return Some(rpr);
                }
            }
        }
    }
    None
}

fn text_element(text: &str) -> XmlElement {
    let mut t = XmlElement::new("w:t").with_attr("xml:space", "preserve");
    t.push(XmlNode::Text(text.to_string()));
    t
}

/// XML 1.0 `Char`, minus the break and tab characters handled as markup.
fn is_xml_text_char(ch: char) -> bool {
    !matches!(ch, '\u{0}'..='\u{1F}' | '\u{FFFE}' | '\u{FFFF}')
}

/// One run carrying `text`; `\n`, `\r\n` and `\r` become `w:br`, tabs become
/// `w:tab`. Characters XML cannot carry are dropped.
fn build_run(text: &str, rpr: Option<XmlElement>) -> XmlElement {
    let mut r = XmlElement::new("w:r");
    if let Some(rpr) = rpr {
        r.push(XmlNode::Element(rpr));
    }
    let mut buf = String::new();
    let mut chars = text.chars().peekable();
    while let Some(ch) = chars.next() {
        let marker = match ch {
            '\r' => {
                chars.next_if_eq(&'\n');
                "w:br"
            }
            '\n' => "w:br",
            '\t' => "w:tab",
            c if !is_xml_text_char(c) => continue,
            _ => {
                buf.push(ch);
                continue;
            }
        };
        if !buf.is_empty() {
            r.push(XmlNode::Element(text_element(&buf)));
            buf.clear();
        }
        r.push(XmlNode::Element(XmlElement::new(marker)));
    }
    if !buf.is_empty() {
        r.push(XmlNode::Element(text_element(&buf)));
    }
    r
}

/// Same element and attributes, paragraph properties kept, content replaced
/// by a single run.
fn rebuild_paragraph(p: &XmlElement, text: &str) -> XmlElement {
    let mut out = XmlElement {
        name: p.name.clone(),
        attrs: p.attrs.clone(),
        children: Vec::new(),
        self_closing: true,
    };
    if let Some(ppr) = p.child("w:pPr") {
        out.push(XmlNode::Element(ppr.clone()));
    }
    if !text.is_empty() {
        out.push(XmlNode::Element(build_run(text, first_run_properties(p))));
    }
    out
}

/// Cell properties kept, content replaced by one paragraph modelled on the
/// cell's first paragraph.
fn rebuild_cell(tc: &XmlElement, text: &str) -> XmlElement {
    let mut out = XmlElement {
        name: tc.name.clone(),
        attrs: tc.attrs.clone(),
        children: Vec::new(),
        self_closing: false,
    };
    if let Some(tcpr) = tc.child("w:tcPr") {
        out.push(XmlNode::Element(tcpr.clone()));
    }
    let para = match cell_paragraphs(tc).first() {
        Some(p) => rebuild_paragraph(p, text),
        None => rebuild_paragraph(&XmlElement::new("w:p"), text),
    };
    out.push(XmlNode::Element(para));
    out
}
