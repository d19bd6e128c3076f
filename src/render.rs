use crate::docx::extract::extract_blocks;
use crate::error::Result;
use crate::ir::{Block, BlockLocator, PartName};

/// Turns a document package into HTML for in-browser preview.
pub trait HtmlRenderer {
    fn render(&self, package: &[u8]) -> Result<String>;
}

/// Renders the block model: headers, body in reading order, footers.
#[derive(Clone, Copy, Debug, Default)]
pub struct BlockHtmlRenderer;

impl HtmlRenderer for BlockHtmlRenderer {
    fn render(&self, package: &[u8]) -> Result<String> {
        let model = extract_blocks(package)?;
        Ok(render_blocks(&model.all))
    }
}

pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            '\n' => out.push_str("<br>"),
            _ => out.push(ch),
        }
    }
    out
}

fn heading_level(style: Option<&str>) -> Option<usize> {
    let style = style?.trim();
    let lower = style.to_ascii_lowercase();
    if lower == "title" {
        return Some(1);
    }
    let digits = lower.strip_prefix("heading")?;
    match digits.trim().parse::<usize>() {
        Ok(n) if (1..=6).contains(&n) => Some(n),
        _ => None,
    }
}

#[derive(Default)]
struct HtmlWriter {
    out: String,
    in_list: bool,
    /// `(table_index, row)` currently open.
    table: Option<(usize, usize)>,
}

impl HtmlWriter {
    fn close_list(&mut self) {
        if self.in_list {
            self.out.push_str("</ul>");
            self.in_list = false;
        }
    }

    fn close_table(&mut self) {
        if self.table.take().is_some() {
            self.out.push_str("</tr></table>");
        }
    }

    fn block(&mut self, b: &Block) {
        match b.locator {
            BlockLocator::Paragraph { .. } => {
                self.close_table();
                let text = escape_html(&b.text);
                if b.list.is_some() {
                    if !self.in_list {
                        self.out.push_str("<ul>");
                        self.in_list = true;
                    }
                    self.out.push_str(&format!("<li>{text}</li>"));
                    return;
                }
                self.close_list();
                match heading_level(b.style.as_deref()) {
                    Some(n) => self.out.push_str(&format!("<h{n}>{text}</h{n}>")),
                    None => self.out.push_str(&format!("<p>{text}</p>")),
                }
            }
            BlockLocator::TableCell {
                table_index, row, ..
            } => {
                self.close_list();
                match self.table {
                    Some((t, r)) if t == table_index && r == row => {}
                    Some((t, _)) if t == table_index => self.out.push_str("</tr><tr>"),
                    _ => {
                        self.close_table();
                        self.out.push_str("<table><tr>");
                    }
                }
                self.table = Some((table_index, row));
                self.out
                    .push_str(&format!("<td>{}</td>", escape_html(&b.text)));
            }
        }
    }

    fn finish_section(&mut self) {
        self.close_list();
        self.close_table();
    }
}

/// Blocks are expected in extraction order.
pub fn render_blocks(blocks: &[Block]) -> String {
    let mut w = HtmlWriter::default();
    let sections: [(&str, fn(&PartName) -> bool); 3] = [
        ("header", |p| matches!(p, PartName::Header(_))),
        ("main", |p| *p == PartName::Body),
        ("footer", |p| matches!(p, PartName::Footer(_))),
    ];
    for (tag, wanted) in sections {
        let mut section = blocks.iter().filter(|b| wanted(&b.part)).peekable();
        if section.peek().is_none() {
            continue;
        }
        w.out.push_str(&format!("<{tag}>"));
        let mut last_part = None;
        for b in section {
            if last_part.is_some_and(|p| p != b.part) {
                w.finish_section();
            }
            last_part = Some(b.part);
            w.block(b);
        }
        w.finish_section();
        w.out.push_str(&format!("</{tag}>"));
    }
    w.out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::ListRef;
    use pretty_assertions::assert_eq;

    #[test]
    fn renders_sections_headings_lists_and_tables() {
        let mut title = Block::paragraph(PartName::Body, 0, "Statement of Work");
        title.style = Some("Title".to_string());
        let mut item = Block::paragraph(PartName::Body, 1, "Build <API>");
        item.list = Some(ListRef {
            num_id: 1,
            indent_level: 0,
        });
        let blocks = vec![
            title,
            item,
            Block::table_cell(PartName::Body, 0, 0, 0, "Role"),
            Block::table_cell(PartName::Body, 0, 0, 1, "Rate"),
            Block::table_cell(PartName::Body, 0, 1, 0, "Dev"),
            Block::table_cell(PartName::Body, 0, 1, 1, "$90/hr"),
            Block::paragraph(PartName::Body, 2, "Signed\nToday"),
            Block::paragraph(PartName::Header(1), 0, "Acme & Co"),
            Block::paragraph(PartName::Footer(1), 0, "Page"),
        ];
        assert_eq!(
            render_blocks(&blocks),
            "<header><p>Acme &amp; Co</p></header>\
             <main><h1>Statement of Work</h1><ul><li>Build &lt;API&gt;</li></ul>\
             <table><tr><td>Role</td><td>Rate</td></tr><tr><td>Dev</td><td>$90/hr</td></tr></table>\
             <p>Signed<br>Today</p></main>\
             <footer><p>Page</p></footer>"
        );
    }

    #[test]
    fn heading_styles_map_to_levels() {
        assert_eq!(heading_level(Some("Heading2")), Some(2));
        assert_eq!(heading_level(Some("heading 3")), Some(3));
        assert_eq!(heading_level(Some("Heading9")), None);
        assert_eq!(heading_level(Some("Normal")), None);
        assert_eq!(heading_level(None), None);
    }

    #[test]
    fn adjacent_tables_are_separate() {
        let blocks = vec![
            Block::table_cell(PartName::Body, 0, 0, 0, "a"),
            Block::table_cell(PartName::Body, 1, 0, 0, "b"),
        ];
        assert_eq!(
            render_blocks(&blocks),
            "<main><table><tr><td>a</td></tr></table><table><tr><td>b</td></tr></table></main>"
        );
    }
}
