#![allow(dead_code)]

use sow_composer::docx::package::{DocxEntry, DocxPackage};

pub const W_NS: &str =
    r#"xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main""#;

pub const STYLES_XML: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<w:styles xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main"><w:style w:type="paragraph" w:styleId="Title"/></w:styles>"#;

pub const IMAGE_BYTES: &[u8] = b"\x89PNG\r\n\x1a\nnot-really-a-png";

/// Body of a small SOW: title, a token split across two runs, an empty
/// paragraph, a list item, a rate table, a content-control paragraph and an
/// unknown token.
pub fn sow_body_xml() -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<w:document {W_NS}><w:body><w:p><w:pPr><w:pStyle w:val="Title"/></w:pPr><w:r><w:t>Statement of Work</w:t></w:r></w:p><w:p w:rsidR="00A1"><w:pPr><w:jc w:val="both"/></w:pPr><w:r><w:rPr><w:b/></w:rPr><w:t xml:space="preserve">Prepared for %%CLIENT</w:t></w:r><w:proofErr w:type="spellStart"/><w:r><w:t>NAME1%% on %%TODAYDATE%%</w:t></w:r></w:p><w:p/><w:p><w:pPr><w:numPr><w:ilvl w:val="0"/><w:numId w:val="3"/></w:numPr></w:pPr><w:r><w:t>Stack: %%TECHSTACK1%%</w:t></w:r></w:p><w:tbl><w:tblPr><w:tblW w:w="0" w:type="auto"/></w:tblPr><w:tr><w:tc><w:tcPr><w:tcW w:w="2000" w:type="dxa"/></w:tcPr><w:p><w:r><w:t>Role</w:t></w:r></w:p></w:tc><w:tc><w:p><w:r><w:t>Rate</w:t></w:r></w:p></w:tc></w:tr><w:tr><w:tc><w:p><w:r><w:t>Engineer</w:t></w:r></w:p></w:tc><w:tc><w:tcPr><w:shd w:fill="EEEEEE"/></w:tcPr><w:p><w:r><w:t>%%RATEPLACEHOLDER1%%</w:t></w:r></w:p><w:p><w:r><w:t>billed %%BILLINGTERMS%%</w:t></w:r></w:p></w:tc></w:tr></w:tbl><w:sdt><w:sdtPr><w:alias w:val="Signature"/></w:sdtPr><w:sdtContent><w:p><w:r><w:t>Signed: %%CLIENTCONTACTNAME%%</w:t></w:r></w:p></w:sdtContent></w:sdt><w:p><w:r><w:t>Ref %%PONUMBER%%</w:t></w:r></w:p><w:sectPr/></w:body></w:document>"#
    )
}

pub fn header_xml() -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<w:hdr {W_NS}><w:p><w:r><w:t>%%KASHTECHNAME1%% | %%CLIENTNAME2%%</w:t></w:r></w:p></w:hdr>"#
    )
}

pub fn footer_xml() -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<w:ftr {W_NS}><w:p><w:r><w:t xml:space="preserve">Generated %%TODAYFOOTER%%</w:t><w:tab/><w:t>Confidential</w:t></w:r></w:p></w:ftr>"#
    )
}

pub fn package_with(body: &str) -> Vec<u8> {
    DocxPackage {
        entries: vec![
            DocxEntry::file("[Content_Types].xml", "<Types/>"),
            DocxEntry::file("word/document.xml", body),
            DocxEntry::file("word/styles.xml", STYLES_XML),
            DocxEntry::file("word/header1.xml", header_xml()),
            DocxEntry::file("word/footer1.xml", footer_xml()),
            DocxEntry::file("word/media/image1.png", IMAGE_BYTES),
        ],
    }
    .to_bytes()
    .expect("build fixture package")
}

pub fn sow_template() -> Vec<u8> {
    package_with(&sow_body_xml())
}

pub fn entry_bytes(package: &[u8], name: &str) -> Vec<u8> {
    DocxPackage::from_bytes(package)
        .expect("open package")
        .entry(name)
        .map(|e| e.data.clone())
        .unwrap_or_else(|| panic!("missing entry {name}"))
}

pub fn entry_text(package: &[u8], name: &str) -> String {
    String::from_utf8(entry_bytes(package, name)).expect("utf-8 entry")
}
