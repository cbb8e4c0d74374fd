//! Source-file enumeration and content extraction.
//!
//! [`FileCollector::collect_files`] lists the eligible files directly under a
//! project's source directory (the processing path does not recurse;
//! eligibility is glob-based). [`FileCollector::read_content`] turns one file
//! into text plus any embedded images: plain files are read verbatim as
//! UTF-8, spreadsheets are parsed sheet by sheet: every populated cell
//! becomes part of a tab-joined row, and embedded images are numbered in
//! document order with a `[figure:N]` marker placed at their anchor row so a
//! downstream summary can correlate prose with figures.
//!
//! Extraction never panics: any read or parse failure surfaces as
//! [`HarnessError::FileRead`] carrying the failing path, which the processor
//! absorbs per file.

use std::collections::{BTreeMap, HashMap};
use std::io::Read;
use std::path::{Path, PathBuf};

use anyhow::Result;
use globset::{Glob, GlobSet, GlobSetBuilder};
use walkdir::WalkDir;

use crate::config::CollectorConfig;
use crate::error::HarnessError;

/// Maximum sheets to process in one workbook.
const XLSX_MAX_SHEETS: usize = 100;
/// Maximum cells to process per sheet (avoids unbounded memory).
const XLSX_MAX_CELLS_PER_SHEET: usize = 100_000;
/// Maximum decompressed bytes to read from a single XML ZIP entry
/// (zip-bomb protection).
const MAX_XML_ENTRY_BYTES: u64 = 50 * 1024 * 1024;
/// Maximum decompressed bytes for one embedded image.
const MAX_IMAGE_ENTRY_BYTES: u64 = 20 * 1024 * 1024;

/// Extracted content of one source file.
#[derive(Debug, Clone)]
pub struct FileContent {
    pub text: String,
    pub images: Vec<ExtractedImage>,
}

/// An image pulled out of a workbook, numbered in document order. The
/// number matches a `[figure:N]` marker in the extracted text.
#[derive(Debug, Clone)]
pub struct ExtractedImage {
    pub figure: usize,
    pub data: Vec<u8>,
}

/// Enumerates and reads the eligible files of a project source directory.
pub struct FileCollector {
    include: GlobSet,
}

impl FileCollector {
    pub fn new(config: &CollectorConfig) -> Result<Self> {
        let mut builder = GlobSetBuilder::new();
        for pattern in &config.include_globs {
            builder.add(Glob::new(pattern)?);
        }
        Ok(Self {
            include: builder.build()?,
        })
    }

    /// Eligible files directly under `source`, in filesystem enumeration
    /// order (unsorted; callers must not rely on ordering).
    pub fn collect_files(&self, source: &Path) -> Result<Vec<PathBuf>, HarnessError> {
        if !source.is_dir() {
            return Err(HarnessError::FileRead {
                path: source.to_path_buf(),
                reason: "source is not a directory".to_string(),
            });
        }

        let mut files = Vec::new();
        for entry in WalkDir::new(source).max_depth(1) {
            let entry = entry.map_err(|e| HarnessError::FileRead {
                path: source.to_path_buf(),
                reason: e.to_string(),
            })?;
            if !entry.file_type().is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy();
            if self.include.is_match(name.as_ref()) {
                files.push(entry.into_path());
            }
        }
        Ok(files)
    }

    /// Reads one file into text + images. Plain files are UTF-8 verbatim;
    /// `.xlsx` goes through workbook extraction.
    pub fn read_content(&self, path: &Path) -> Result<FileContent, HarnessError> {
        let read_err = |reason: String| HarnessError::FileRead {
            path: path.to_path_buf(),
            reason,
        };
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase());
        match ext.as_deref() {
            Some("xlsx") => {
                let bytes = std::fs::read(path).map_err(|e| read_err(e.to_string()))?;
                extract_workbook(&bytes).map_err(read_err)
            }
            _ => {
                let text = std::fs::read_to_string(path).map_err(|e| read_err(e.to_string()))?;
                Ok(FileContent {
                    text,
                    images: Vec::new(),
                })
            }
        }
    }
}

// ============ Workbook extraction ============

type WorkbookArchive<'a> = zip::ZipArchive<std::io::Cursor<&'a [u8]>>;

fn extract_workbook(bytes: &[u8]) -> Result<FileContent, String> {
    let mut archive =
        zip::ZipArchive::new(std::io::Cursor::new(bytes)).map_err(|e| e.to_string())?;
    let shared = read_shared_strings(&mut archive)?;
    let sheets = worksheet_names(&archive);

    let mut text = String::new();
    let mut images: Vec<ExtractedImage> = Vec::new();

    for name in sheets.into_iter().take(XLSX_MAX_SHEETS) {
        let Some(sheet_xml) = read_zip_entry(&mut archive, &name, MAX_XML_ENTRY_BYTES)? else {
            continue;
        };
        let rows = sheet_rows(&sheet_xml, &shared)?;
        let mut row_text: BTreeMap<u32, String> = rows
            .into_iter()
            .map(|(row, cells)| (row, cells.join("\t")))
            .collect();

        for (anchor_row, data) in sheet_images(&mut archive, &name)? {
            let figure = images.len() + 1;
            // drawing anchors are 0-based, worksheet rows 1-based
            let entry = row_text.entry(anchor_row + 1).or_default();
            if !entry.is_empty() {
                entry.push('\t');
            }
            entry.push_str(&format!("[figure:{}]", figure));
            images.push(ExtractedImage { figure, data });
        }

        for line in row_text.values() {
            if !text.is_empty() {
                text.push('\n');
            }
            text.push_str(line);
        }
    }

    Ok(FileContent { text, images })
}

/// Reads a ZIP entry bounded by `max_bytes`. `Ok(None)` when the entry does
/// not exist (optional workbook parts).
fn read_zip_entry(
    archive: &mut WorkbookArchive,
    name: &str,
    max_bytes: u64,
) -> Result<Option<Vec<u8>>, String> {
    let entry = match archive.by_name(name) {
        Ok(entry) => entry,
        Err(zip::result::ZipError::FileNotFound) => return Ok(None),
        Err(e) => return Err(e.to_string()),
    };
    let mut out = Vec::new();
    entry
        .take(max_bytes)
        .read_to_end(&mut out)
        .map_err(|e| e.to_string())?;
    if out.len() as u64 >= max_bytes {
        return Err(format!(
            "ZIP entry {} exceeds size limit ({} bytes)",
            name, max_bytes
        ));
    }
    Ok(Some(out))
}

fn worksheet_names(archive: &WorkbookArchive) -> Vec<String> {
    let mut names: Vec<String> = archive
        .file_names()
        .filter(|n| n.starts_with("xl/worksheets/sheet") && n.ends_with(".xml"))
        .map(|s| s.to_string())
        .collect();
    names.sort_by_key(|name| {
        name.trim_start_matches("xl/worksheets/sheet")
            .trim_end_matches(".xml")
            .parse::<u32>()
            .unwrap_or(u32::MAX)
    });
    names
}

fn read_shared_strings(archive: &mut WorkbookArchive) -> Result<Vec<String>, String> {
    let Some(xml) = read_zip_entry(archive, "xl/sharedStrings.xml", MAX_XML_ENTRY_BYTES)? else {
        return Ok(Vec::new());
    };
    let mut strings = Vec::new();
    let mut reader = quick_xml::Reader::from_reader(xml.as_slice());
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();
    let mut in_si = false;
    let mut current = String::new();
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(quick_xml::events::Event::Start(e)) => {
                if e.local_name().as_ref() == b"si" {
                    in_si = true;
                    current.clear();
                } else if in_si && e.local_name().as_ref() == b"t" {
                    if let Ok(quick_xml::events::Event::Text(te)) = reader.read_event_into(&mut buf)
                    {
                        current.push_str(te.unescape().unwrap_or_default().as_ref());
                    }
                }
            }
            Ok(quick_xml::events::Event::End(e)) => {
                if e.local_name().as_ref() == b"si" {
                    strings.push(std::mem::take(&mut current));
                    in_si = false;
                }
            }
            Ok(quick_xml::events::Event::Eof) => break,
            Err(e) => return Err(e.to_string()),
            _ => {}
        }
        buf.clear();
    }
    Ok(strings)
}

/// Populated cells of one sheet, keyed by 1-based row index, in cell order.
fn sheet_rows(xml: &[u8], shared: &[String]) -> Result<BTreeMap<u32, Vec<String>>, String> {
    let mut rows: BTreeMap<u32, Vec<String>> = BTreeMap::new();
    let mut reader = quick_xml::Reader::from_reader(xml);
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();
    let mut current_row: u32 = 1;
    let mut next_row_guess: u32 = 1;
    let mut cell_is_shared = false;
    let mut in_v = false;
    let mut cell_count = 0usize;
    loop {
        if cell_count >= XLSX_MAX_CELLS_PER_SHEET {
            break;
        }
        match reader.read_event_into(&mut buf) {
            Ok(quick_xml::events::Event::Start(e)) => match e.local_name().as_ref() {
                b"row" => {
                    current_row = attr_value(&e, b"r")
                        .and_then(|v| v.parse().ok())
                        .unwrap_or(next_row_guess);
                    next_row_guess = current_row + 1;
                }
                b"c" => {
                    cell_is_shared = attr_value(&e, b"t").as_deref() == Some("s");
                }
                b"v" => in_v = true,
                _ => {}
            },
            Ok(quick_xml::events::Event::Text(te)) if in_v => {
                let v = te.unescape().unwrap_or_default();
                let s = v.trim();
                if !s.is_empty() {
                    let resolved = if cell_is_shared {
                        s.parse::<usize>()
                            .ok()
                            .and_then(|i| shared.get(i))
                            .cloned()
                    } else {
                        Some(s.to_string())
                    };
                    if let Some(value) = resolved {
                        rows.entry(current_row).or_default().push(value);
                        cell_count += 1;
                    }
                }
                in_v = false;
            }
            Ok(quick_xml::events::Event::End(e)) => match e.local_name().as_ref() {
                b"v" => in_v = false,
                b"c" => cell_is_shared = false,
                _ => {}
            },
            Ok(quick_xml::events::Event::Eof) => break,
            Err(e) => return Err(e.to_string()),
            _ => {}
        }
        buf.clear();
    }
    Ok(rows)
}

/// Embedded images of one sheet as `(0-based anchor row, bytes)`, in the
/// drawing's document order. Sheets without a drawing part yield nothing.
fn sheet_images(
    archive: &mut WorkbookArchive,
    sheet_name: &str,
) -> Result<Vec<(u32, Vec<u8>)>, String> {
    let Some(rels_xml) = read_zip_entry(archive, &rels_path_for(sheet_name), MAX_XML_ENTRY_BYTES)?
    else {
        return Ok(Vec::new());
    };
    let sheet_dir = part_dir(sheet_name);
    let drawing_part = parse_relationships(&rels_xml)?
        .into_iter()
        .find(|rel| rel.kind.ends_with("/drawing"))
        .map(|rel| resolve_rel_target(sheet_dir, &rel.target));
    let Some(drawing_part) = drawing_part else {
        return Ok(Vec::new());
    };

    let Some(drawing_xml) = read_zip_entry(archive, &drawing_part, MAX_XML_ENTRY_BYTES)? else {
        return Ok(Vec::new());
    };
    let anchors = drawing_anchors(&drawing_xml)?;
    if anchors.is_empty() {
        return Ok(Vec::new());
    }

    let Some(drawing_rels) =
        read_zip_entry(archive, &rels_path_for(&drawing_part), MAX_XML_ENTRY_BYTES)?
    else {
        return Ok(Vec::new());
    };
    let drawing_dir = part_dir(&drawing_part).to_string();
    let targets: HashMap<String, String> = parse_relationships(&drawing_rels)?
        .into_iter()
        .map(|rel| (rel.id, resolve_rel_target(&drawing_dir, &rel.target)))
        .collect();

    let mut out = Vec::new();
    for (row, rid) in anchors {
        let Some(part) = targets.get(&rid) else {
            continue;
        };
        if let Some(data) = read_zip_entry(archive, part, MAX_IMAGE_ENTRY_BYTES)? {
            out.push((row, data));
        }
    }
    Ok(out)
}

/// `(anchor row, relationship id)` pairs in document order. The anchor row
/// comes from the `<from>` element preceding each `<blip>` reference.
fn drawing_anchors(xml: &[u8]) -> Result<Vec<(u32, String)>, String> {
    let mut anchors = Vec::new();
    let mut reader = quick_xml::Reader::from_reader(xml);
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();
    let mut in_from = false;
    let mut in_from_row = false;
    let mut current_row: u32 = 0;
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(quick_xml::events::Event::Start(e)) => match e.local_name().as_ref() {
                b"from" => in_from = true,
                b"row" if in_from => in_from_row = true,
                b"blip" => {
                    if let Some(rid) = attr_value(&e, b"embed") {
                        anchors.push((current_row, rid));
                    }
                }
                _ => {}
            },
            Ok(quick_xml::events::Event::Empty(e)) => {
                if e.local_name().as_ref() == b"blip" {
                    if let Some(rid) = attr_value(&e, b"embed") {
                        anchors.push((current_row, rid));
                    }
                }
            }
            Ok(quick_xml::events::Event::Text(te)) if in_from_row => {
                if let Ok(row) = te.unescape().unwrap_or_default().trim().parse() {
                    current_row = row;
                }
            }
            Ok(quick_xml::events::Event::End(e)) => match e.local_name().as_ref() {
                b"from" => in_from = false,
                b"row" => in_from_row = false,
                _ => {}
            },
            Ok(quick_xml::events::Event::Eof) => break,
            Err(e) => return Err(e.to_string()),
            _ => {}
        }
        buf.clear();
    }
    Ok(anchors)
}

struct Relationship {
    id: String,
    kind: String,
    target: String,
}

fn parse_relationships(xml: &[u8]) -> Result<Vec<Relationship>, String> {
    let mut rels = Vec::new();
    let mut reader = quick_xml::Reader::from_reader(xml);
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(quick_xml::events::Event::Start(e))
            | Ok(quick_xml::events::Event::Empty(e)) => {
                if e.local_name().as_ref() == b"Relationship" {
                    let id = attr_value(&e, b"Id");
                    let kind = attr_value(&e, b"Type");
                    let target = attr_value(&e, b"Target");
                    if let (Some(id), Some(kind), Some(target)) = (id, kind, target) {
                        rels.push(Relationship { id, kind, target });
                    }
                }
            }
            Ok(quick_xml::events::Event::Eof) => break,
            Err(e) => return Err(e.to_string()),
            _ => {}
        }
        buf.clear();
    }
    Ok(rels)
}

fn attr_value(e: &quick_xml::events::BytesStart, name: &[u8]) -> Option<String> {
    e.attributes().flatten().find_map(|a| {
        if a.key.local_name().as_ref() == name {
            Some(String::from_utf8_lossy(&a.value).into_owned())
        } else {
            None
        }
    })
}

/// `xl/worksheets/sheet1.xml` → `xl/worksheets/_rels/sheet1.xml.rels`
fn rels_path_for(part: &str) -> String {
    match part.rsplit_once('/') {
        Some((dir, file)) => format!("{}/_rels/{}.rels", dir, file),
        None => format!("_rels/{}.rels", part),
    }
}

fn part_dir(part: &str) -> &str {
    part.rsplit_once('/').map(|(dir, _)| dir).unwrap_or("")
}

/// Resolves a relationship target (possibly `../`-relative) against the
/// directory of the part that declared it.
fn resolve_rel_target(base_dir: &str, target: &str) -> String {
    let mut parts: Vec<&str> = if base_dir.is_empty() {
        Vec::new()
    } else {
        base_dir.split('/').collect()
    };
    for seg in target.trim_start_matches('/').split('/') {
        match seg {
            ".." => {
                parts.pop();
            }
            "." | "" => {}
            s => parts.push(s),
        }
    }
    parts.join("/")
}
