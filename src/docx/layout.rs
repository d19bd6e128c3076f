use crate::docx::tree::{NodePath, XmlElement, XmlNode, XmlTree};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LayoutItem {
    Paragraph(usize),
    Table(usize),
}

#[derive(Clone, Debug, Default)]
pub struct TableLayout {
    pub rows: Vec<Vec<NodePath>>,
}

#[derive(Clone, Debug, Default)]
pub struct PartLayout {
    pub paragraphs: Vec<NodePath>,
    pub tables: Vec<TableLayout>,
    /// Paragraphs and tables in reading order.
    pub order: Vec<LayoutItem>,
}

impl PartLayout {
    pub fn paragraph(&self, index: usize) -> Option<&NodePath> {
        self.paragraphs.get(index)
    }

    pub fn cell(&self, table_index: usize, row: usize, col: usize) -> Option<&NodePath> {
        self.tables.get(table_index)?.rows.get(row)?.get(col)
    }
}

/// Block-level wrappers whose content belongs to the enclosing container.
fn is_transparent(name: &str) -> bool {
    matches!(name, "w:sdt" | "w:sdtContent" | "w:customXml")
}

/// Visits block-level children of `el`, stepping through content controls.
fn visit_blocks<'a>(
    el: &'a XmlElement,
    path: &NodePath,
    f: &mut dyn FnMut(&'a XmlElement, NodePath),
) {
    for (i, child) in el.children.iter().enumerate() {
        let XmlNode::Element(c) = child else {
            continue;
        };
        let mut p = path.clone();
        p.push(i);
        if is_transparent(&c.name) {
            if c.name == "w:sdt" {
                if let Some(pos) = c
                    .children
                    .iter()
                    .position(|n| matches!(n, XmlNode::Element(e) if e.name == "w:sdtContent"))
                {
                    let mut content_path = p.clone();
                    content_path.push(pos);
                    if let XmlNode::Element(content) = &c.children[pos] {
                        visit_blocks(content, &content_path, f);
                    }
                }
            } else {
                visit_blocks(c, &p, f);
            }
            continue;
        }
        f(c, p);
    }
}

/// Path of the element whose children are the part's blocks: `w:body` for the
/// main document, the root element (`w:hdr`, `w:ftr`) otherwise.
pub fn container_path(tree: &XmlTree) -> Option<NodePath> {
    let root_path = tree.root_path()?;
    let root = tree.element_at(&root_path)?;
    if root.name != "w:document" {
        return Some(root_path);
    }
    let pos = root
        .children
        .iter()
        .position(|n| matches!(n, XmlNode::Element(e) if e.name == "w:body"))?;
    let mut p = root_path;
    p.push(pos);
    Some(p)
}

/// Paragraphs and tables of a part in reading order. Extraction and
/// regeneration both resolve coordinates through this scan.
pub fn scan_layout(tree: &XmlTree) -> PartLayout {
    let mut layout = PartLayout::default();
    let Some(cpath) = container_path(tree) else {
        return layout;
    };
    let Some(container) = tree.element_at(&cpath) else {
        return layout;
    };

    visit_blocks(container, &cpath, &mut |el, path| match el.name.as_str() {
        "w:p" => {
            layout.order.push(LayoutItem::Paragraph(layout.paragraphs.len()));
            layout.paragraphs.push(path);
        }
        "w:tbl" => {
            layout.order.push(LayoutItem::Table(layout.tables.len()));
            layout.tables.push(scan_table(el, &path));
        }
        _ => {}
    });
    layout
}

fn scan_table(tbl: &XmlElement, path: &NodePath) -> TableLayout {
    let mut rows: Vec<Vec<NodePath>> = Vec::new();
    visit_blocks(tbl, path, &mut |row, row_path| {
        if row.name != "w:tr" {
            return;
        }
        let mut cells: Vec<NodePath> = Vec::new();
        visit_blocks(row, &row_path, &mut |cell, cell_path| {
            if cell.name == "w:tc" {
                cells.push(cell_path);
            }
        });
        rows.push(cells);
    });
    TableLayout { rows }
}
