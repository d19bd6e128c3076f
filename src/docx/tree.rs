use anyhow::{anyhow, Context};

use crate::docx::xml::{XmlEvent, XmlPart};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum XmlNode {
    Element(XmlElement),
    Text(String),
    /// Declarations, comments, CDATA, processing instructions.
    Other(XmlEvent),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct XmlElement {
    pub name: String,
    pub attrs: Vec<(String, String)>,
    pub children: Vec<XmlNode>,
    pub self_closing: bool,
}

/// Index into the top-level node list, then child indices.
pub type NodePath = Vec<usize>;

impl XmlElement {
    pub fn new(name: &str) -> Self {
        XmlElement {
            name: name.to_string(),
            attrs: Vec::new(),
            children: Vec::new(),
            self_closing: true,
        }
    }

    pub fn with_attr(mut self, key: &str, value: &str) -> Self {
        self.attrs.push((key.to_string(), value.to_string()));
        self
    }

    pub fn push(&mut self, node: XmlNode) {
        self.children.push(node);
        self.self_closing = false;
    }

    pub fn child(&self, name: &str) -> Option<&XmlElement> {
        self.child_elements().find(|e| e.name == name)
    }

    pub fn child_elements(&self) -> impl Iterator<Item = &XmlElement> {
        self.children.iter().filter_map(|c| match c {
            XmlNode::Element(e) => Some(e),
            _ => None,
        })
    }

    pub fn attr(&self, key: &str) -> Option<&str> {
        crate::docx::xml::find_attr(&self.attrs, key)
    }

    fn write_events(&self, out: &mut Vec<XmlEvent>) {
        if self.self_closing && self.children.is_empty() {
            out.push(XmlEvent::Empty {
                name: self.name.clone(),
                attrs: self.attrs.clone(),
            });
            return;
        }
        out.push(XmlEvent::Start {
            name: self.name.clone(),
            attrs: self.attrs.clone(),
        });
        for c in &self.children {
            c.write_events(out);
        }
        out.push(XmlEvent::End {
            name: self.name.clone(),
        });
    }
}

impl XmlNode {
    fn write_events(&self, out: &mut Vec<XmlEvent>) {
        match self {
            XmlNode::Element(e) => e.write_events(out),
            XmlNode::Text(t) => out.push(XmlEvent::Text { text: t.clone() }),
            XmlNode::Other(ev) => out.push(ev.clone()),
        }
    }
}

#[derive(Clone, Debug)]
pub struct XmlTree {
    pub name: String,
    pub nodes: Vec<XmlNode>,
}

impl XmlTree {
    pub fn from_part(part: XmlPart) -> anyhow::Result<Self> {
        let mut top: Vec<XmlNode> = Vec::new();
        let mut stack: Vec<XmlElement> = Vec::new();

        fn attach(stack: &mut [XmlElement], top: &mut Vec<XmlNode>, node: XmlNode) {
            match stack.last_mut() {
                Some(parent) => parent.children.push(node),
                None => top.push(node),
            }
        }

        for ev in part.events {
            match ev {
                XmlEvent::Start { name, attrs } => stack.push(XmlElement {
                    name,
                    attrs,
                    children: Vec::new(),
                    self_closing: false,
                }),
                XmlEvent::End { name } => {
                    let el = stack
                        .pop()
                        .with_context(|| format!("{}: unexpected </{name}>", part.name))?;
                    if el.name != name {
                        return Err(anyhow!(
                            "{}: </{name}> closes <{}>",
                            part.name,
                            el.name
                        ));
                    }
                    attach(&mut stack, &mut top, XmlNode::Element(el));
                }
                XmlEvent::Empty { name, attrs } => attach(
                    &mut stack,
                    &mut top,
                    XmlNode::Element(XmlElement {
                        name,
                        attrs,
                        children: Vec::new(),
                        self_closing: true,
                    }),
                ),
                XmlEvent::Text { text } => attach(&mut stack, &mut top, XmlNode::Text(text)),
                other => attach(&mut stack, &mut top, XmlNode::Other(other)),
            }
        }
        if let Some(open) = stack.last() {
            return Err(anyhow!("{}: <{}> is never closed", part.name, open.name));
        }

        Ok(XmlTree {
            name: part.name,
            nodes: top,
        })
    }

    pub fn to_part(&self) -> XmlPart {
        let mut events = Vec::new();
        for n in &self.nodes {
            n.write_events(&mut events);
        }
        XmlPart {
            name: self.name.clone(),
            events,
        }
    }

    /// Path of the document element.
    pub fn root_path(&self) -> Option<NodePath> {
        self.nodes
            .iter()
            .position(|n| matches!(n, XmlNode::Element(_)))
            .map(|i| vec![i])
    }

    pub fn node_at(&self, path: &[usize]) -> Option<&XmlNode> {
        let (first, rest) = path.split_first()?;
        let mut cur = self.nodes.get(*first)?;
        for &i in rest {
            match cur {
                XmlNode::Element(e) => cur = e.children.get(i)?,
                _ => return None,
            }
        }
        Some(cur)
    }

    pub fn element_at(&self, path: &[usize]) -> Option<&XmlElement> {
        match self.node_at(path)? {
            XmlNode::Element(e) => Some(e),
            _ => None,
        }
    }

    /// Swaps the node at `path`; returns false when the path does not resolve.
    pub fn replace_at(&mut self, path: &[usize], node: XmlNode) -> bool {
        let Some((last, parents)) = path.split_last() else {
            return false;
        };
        let siblings = if parents.is_empty() {
            &mut self.nodes
        } else {
            let Some((first, rest)) = parents.split_first() else {
                return false;
            };
            let Some(mut cur) = self.nodes.get_mut(*first) else {
                return false;
            };
            for &i in rest {
                match cur {
                    XmlNode::Element(e) => match e.children.get_mut(i) {
                        Some(c) => cur = c,
                        None => return false,
                    },
                    _ => return false,
                }
            }
            match cur {
                XmlNode::Element(e) => &mut e.children,
                _ => return false,
            }
        };
        match siblings.get_mut(*last) {
            Some(slot) => {
                *slot = node;
                true
            }
            None => false,
        }
    }
}
