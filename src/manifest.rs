// Reads the bits of imsmanifest.xml the registry records about a package.

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::{
    collections::HashMap,
    fs,
    path::{Path, PathBuf},
};
use thiserror::Error;
use walkdir::WalkDir;

pub const MANIFEST_FILE: &str = "imsmanifest.xml";

#[derive(Error, Debug)]
pub enum ManifestError {
    #[error("imsmanifest.xml not found")]
    Missing,
    #[error("failed to parse manifest: {0}")]
    Parse(String),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ManifestInfo {
    /// `identifier` attribute of the root `<manifest>` element.
    pub identifier: Option<String>,
    /// Launch href of the first item in the default organization.
    pub launch_href: Option<String>,
}

/// Finds the shallowest manifest under `dir`.
pub fn find_manifest(dir: &Path) -> Result<PathBuf, ManifestError> {
    WalkDir::new(dir)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file() && e.file_name() == MANIFEST_FILE)
        .min_by_key(|e| e.depth())
        .map(|e| e.into_path())
        .ok_or(ManifestError::Missing)
}

pub fn read_manifest(dir: &Path) -> Result<ManifestInfo, ManifestError> {
    let path = find_manifest(dir)?;
    let xml = fs::read_to_string(&path).map_err(|_| ManifestError::Missing)?;
    parse_manifest(&xml)
}

pub fn parse_manifest(xml: &str) -> Result<ManifestInfo, ManifestError> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);
    let mut buf = Vec::new();

    let mut identifier = None;
    let mut default_org: Option<String> = None;
    let mut current_org: Option<String> = None;
    let mut first_ref_default: Option<String> = None;
    let mut first_ref_any: Option<String> = None;
    let mut resources: HashMap<String, String> = HashMap::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) => match local_name(&e).as_str() {
                "manifest" if identifier.is_none() => identifier = get_attr(&e, "identifier"),
                "organizations" => default_org = get_attr(&e, "default"),
                "organization" => current_org = get_attr(&e, "identifier"),
                "item" => {
                    if let Some(iref) = get_attr(&e, "identifierref") {
                        let in_default = match (&default_org, &current_org) {
                            (Some(def), Some(cur)) => def == cur,
                            (None, Some(_)) => true,
                            _ => false,
                        };
                        if in_default && first_ref_default.is_none() {
                            first_ref_default = Some(iref.clone());
                        }
                        first_ref_any.get_or_insert(iref);
                    }
                }
                "resource" => {
                    if let (Some(id), Some(href)) = (get_attr(&e, "identifier"), get_attr(&e, "href")) {
                        resources.insert(id, href);
                    }
                }
                _ => {}
            },
            Ok(Event::End(e)) => {
                if e.local_name().as_ref() == b"organization" {
                    current_org = None;
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(ManifestError::Parse(e.to_string())),
            _ => {}
        }
        buf.clear();
    }

    let launch_href = first_ref_default
        .or(first_ref_any)
        .and_then(|r| resources.get(&r).cloned());

    Ok(ManifestInfo { identifier, launch_href })
}

fn local_name(tag: &BytesStart<'_>) -> String {
    String::from_utf8_lossy(tag.local_name().as_ref()).into_owned()
}

fn get_attr(e: &BytesStart<'_>, key_local: &str) -> Option<String> {
    e.attributes()
        .flatten()
        .find(|a| a.key.local_name().as_ref() == key_local.as_bytes())
        .and_then(|a| a.unescape_value().ok().map(|v| v.into_owned()))
}
