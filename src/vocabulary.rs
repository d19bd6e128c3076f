use std::collections::BTreeMap;

use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::engine::DocumentKind;
use crate::substitute::{coerce_value, ReplacementMap};

static WHITESPACE_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("whitespace regex"));

/// One client engagement, as submitted from the document generation form.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EngagementRequest {
    pub company_name: String,
    pub industry: Option<String>,
    pub services: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    #[serde(alias = "clientContactName")]
    pub client_contact: Option<String>,
    pub client_email: Option<String>,
    pub client_phone: Option<String>,
    /// Overrides the configured provider contact for this engagement.
    #[serde(rename = "kasTechContact", alias = "providerContact")]
    pub provider_contact: Option<String>,
    #[serde(rename = "kasTechEmail", alias = "providerEmail")]
    pub provider_email: Option<String>,
    #[serde(rename = "kasTechPhone", alias = "providerPhone")]
    pub provider_phone: Option<String>,
    pub tech_stack: Option<String>,
    pub engagement_model: Option<String>,
    pub billing_terms: Option<String>,
    pub estimated_duration: Option<String>,
    /// Anything else is passed through as a token key.
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

/// The service provider's identity, filled into the provider tokens.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderIdentity {
    pub name: String,
    pub contact_name: String,
    pub contact_email: String,
    pub contact_phone: String,
    pub consultant_name: String,
    pub rates: Vec<String>,
}

impl Default for ProviderIdentity {
    fn default() -> Self {
        ProviderIdentity {
            name: "KashTech".to_string(),
            contact_name: "Provider Contact".to_string(),
            contact_email: "contact@example.com".to_string(),
            contact_phone: "000-000-0000".to_string(),
            consultant_name: "Lead Consultant".to_string(),
            rates: ["$120/hr", "$100/hr", "$130/hr", "$90/hr"]
                .into_iter()
                .map(String::from)
                .collect(),
        }
    }
}

/// How many numbered copies (`KEY1..KEYn`) of each repeated token a template
/// carries.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SlotCounts {
    #[serde(rename = "CLIENTNAME")]
    pub client_name: usize,
    #[serde(rename = "KASHTECHNAME")]
    pub provider_name: usize,
    #[serde(rename = "KASHCONTACTNAME")]
    pub provider_contact: usize,
    #[serde(rename = "TECHSTACK")]
    pub tech_stack: usize,
}

impl Default for SlotCounts {
    fn default() -> Self {
        SlotCounts {
            client_name: 6,
            provider_name: 9,
            provider_contact: 2,
            tech_stack: 5,
        }
    }
}

fn numbered(map: &mut ReplacementMap, key: &str, count: usize, value: &str) {
    for i in 1..=count {
        map.insert(format!("{key}{i}"), value);
    }
}

fn or_default<'a>(value: &'a Option<String>, fallback: &'a str) -> &'a str {
    value.as_deref().unwrap_or(fallback)
}

pub fn build_replacements(
    req: &EngagementRequest,
    provider: &ProviderIdentity,
    slots: &SlotCounts,
    today: NaiveDate,
) -> ReplacementMap {
    let mut map = ReplacementMap::new();

    // Extra keys first so the named fields below always win.
    for (k, v) in &req.extra {
        map.insert(k.as_str(), coerce_value(v));
    }

    let company = req.company_name.as_str();
    numbered(&mut map, "CLIENTNAME", slots.client_name, company);
    map.insert("CLIENTORGANIZATION", company);
    map.insert(
        "CLIENTCONTACTNAME",
        or_default(&req.client_contact, "Client Representative"),
    );
    map.insert(
        "CLIENTCONTACTEMAIL",
        or_default(&req.client_email, "client@example.com"),
    );
    map.insert(
        "CLIENTCONTACTPHONE",
        or_default(&req.client_phone, "123-456-7890"),
    );

    numbered(&mut map, "KASHTECHNAME", slots.provider_name, &provider.name);
    numbered(
        &mut map,
        "KASHCONTACTNAME",
        slots.provider_contact,
        or_default(&req.provider_contact, &provider.contact_name),
    );
    map.insert(
        "KASHCONTACTEMAIL",
        or_default(&req.provider_email, &provider.contact_email),
    );
    map.insert(
        "KASHCONTACTPHONE",
        or_default(&req.provider_phone, &provider.contact_phone),
    );
    map.insert("CONSULTANTNAME", provider.consultant_name.as_str());

    map.insert("SERVICES", or_default(&req.services, ""));
    numbered(
        &mut map,
        "TECHSTACK",
        slots.tech_stack,
        or_default(&req.tech_stack, "Java, React, PostgreSQL"),
    );
    map.insert("ENGAGEMENTMODEL", or_default(&req.engagement_model, "T&M"));
    map.insert(
        "BILLINGTERMS",
        or_default(&req.billing_terms, "monthly hours logged"),
    );
    map.insert(
        "ESTIMATEDDURATION",
        or_default(&req.estimated_duration, "6 months"),
    );
    for (i, rate) in provider.rates.iter().enumerate() {
        map.insert(format!("RATEPLACEHOLDER{}", i + 1), rate.as_str());
    }

    map.insert("TODAYDATE", today.format("%B %-d, %Y").to_string());
    map.insert("TODAYFOOTER", today.format("%b %d, %Y").to_string());

    for (key, value) in [
        ("INDUSTRY", &req.industry),
        ("STARTDATE", &req.start_date),
        ("ENDDATE", &req.end_date),
    ] {
        if let Some(v) = value {
            map.insert(key, v.as_str());
        }
    }
    map
}

/// `SOW_Acme_Corp.docx` for company "Acme  Corp".
pub fn download_file_name(kind: DocumentKind, company: &str) -> String {
    let company = WHITESPACE_RUN.replace_all(company.trim(), "_");
    format!("{}_{company}.docx", kind.label())
}
