//! Ingestion-time splitting of source documents into passages.
//!
//! Tables and question/answer pairs are kept whole. Remaining prose is grouped under the
//! nearest section header; documents without any recognizable structure fall back to
//! overlapping character windows cut at word or sentence edges.

pub mod keywords;
pub mod qa;
pub mod sections;
pub mod table;

use std::fs;
use std::io;
use std::path::Path;

use serde::{Deserialize, Serialize};
use text_splitter::{ChunkConfig, MarkdownSplitter, TextSplitter};

use crate::domain::language::detect_language;
use crate::domain::passage::{Category, Passage, PassageId};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceDocument {
    pub source_id: String,
    pub title: String,
    #[serde(default)]
    pub category_hint: Option<String>,
    pub text: String,
}

const DOCUMENT_EXTENSIONS: &[&str] = &["md", "markdown", "txt"];

impl SourceDocument {
    /// Reads a text or markdown file. The source id is the file stem; the title is the first
    /// markdown `#` header, or the stem when the file has none.
    pub fn from_file(path: &Path, category_hint: Option<String>) -> io::Result<Self> {
        let text = fs::read_to_string(path)?;
        let source_id = path
            .file_stem()
            .and_then(|stem| stem.to_str())
            .unwrap_or("document")
            .to_string();
        let title = text
            .lines()
            .map(str::trim)
            .find_map(|line| line.strip_prefix('#').map(|rest| rest.trim_start_matches('#').trim()))
            .filter(|title| !title.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| source_id.clone());
        Ok(Self { source_id, title, category_hint, text })
    }

    /// Every text or markdown file directly under `dir`, in file-name order. The parent
    /// directory name is not used; category comes from the content.
    pub fn load_directory(dir: &Path) -> io::Result<Vec<Self>> {
        let mut paths = Vec::new();
        for entry in fs::read_dir(dir)? {
            let path = entry?.path();
            let supported = path
                .extension()
                .and_then(|extension| extension.to_str())
                .is_some_and(|extension| DOCUMENT_EXTENSIONS.contains(&extension.to_ascii_lowercase().as_str()));
            if path.is_file() && supported {
                paths.push(path);
            }
        }
        paths.sort();
        paths.iter().map(|path| Self::from_file(path, None)).collect()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChunkerOptions {
    pub max_chars: usize,
    /// Window size for unstructured text.
    pub window_chars: usize,
    pub overlap_chars: usize,
}

impl Default for ChunkerOptions {
    fn default() -> Self {
        Self { max_chars: 1200, window_chars: 800, overlap_chars: 200 }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
enum Block {
    Heading(String),
    Table { caption: Option<String>, table: table::Table },
    Qa(qa::QaPair),
    Paragraph(String),
}

impl Block {
    fn is_structural(&self) -> bool {
        !matches!(self, Self::Paragraph(_))
    }
}

/// Text of one future passage plus the section label it sits under.
struct Draft {
    section: String,
    text: String,
}

#[derive(Clone, Debug, Default)]
pub struct Chunker {
    options: ChunkerOptions,
}

impl Chunker {
    pub fn new(options: ChunkerOptions) -> Self {
        Self { options }
    }

    pub fn chunk(&self, document: &SourceDocument) -> Vec<Passage> {
        let pages: Vec<&str> = document
            .text
            .split('\u{000C}')
            .filter(|page| !sections::is_boilerplate_page(page))
            .collect();
        if pages.is_empty() {
            return Vec::new();
        }

        let blocks: Vec<Block> = pages.iter().flat_map(|page| parse_blocks(page)).collect();
        let drafts = if blocks.iter().any(Block::is_structural) {
            self.drafts_from_blocks(&document.title, blocks)
        } else {
            self.windows(&document.title, &pages)
        };

        drafts
            .into_iter()
            .filter(|draft| !draft.text.trim().is_empty())
            .enumerate()
            .map(|(ordinal, draft)| build_passage(document, ordinal, draft))
            .collect()
    }

    fn drafts_from_blocks(&self, title: &str, blocks: Vec<Block>) -> Vec<Draft> {
        let mut drafts = Vec::new();
        let mut section = title.to_string();
        let mut prose: Vec<String> = Vec::new();

        for block in blocks {
            match block {
                Block::Paragraph(text) => prose.push(text),
                Block::Heading(label) => {
                    self.flush_prose(&section, &mut prose, &mut drafts);
                    section = label;
                }
                Block::Table { caption, table } => {
                    self.flush_prose(&section, &mut prose, &mut drafts);
                    let rendered = table.render();
                    let text = match caption {
                        Some(caption) => format!("{caption}\n{rendered}"),
                        None => rendered,
                    };
                    drafts.push(Draft { section: section.clone(), text });
                }
                Block::Qa(pair) => {
                    self.flush_prose(&section, &mut prose, &mut drafts);
                    drafts.push(Draft { section: section.clone(), text: pair.render() });
                }
            }
        }
        self.flush_prose(&section, &mut prose, &mut drafts);
        drafts
    }

    /// Packs paragraphs into passages of at most `max_chars`; a paragraph longer than that on
    /// its own goes through the markdown splitter.
    fn flush_prose(&self, section: &str, prose: &mut Vec<String>, drafts: &mut Vec<Draft>) {
        let mut current = String::new();
        for paragraph in prose.drain(..) {
            if paragraph.chars().count() > self.options.max_chars {
                if !current.is_empty() {
                    drafts.push(Draft { section: section.to_string(), text: std::mem::take(&mut current) });
                }
                let splitter = MarkdownSplitter::new(self.options.max_chars.max(1));
                for piece in splitter.chunks(&paragraph) {
                    drafts.push(Draft { section: section.to_string(), text: piece.to_string() });
                }
                continue;
            }

            let joined_len = current.chars().count() + paragraph.chars().count() + 2;
            if !current.is_empty() && joined_len > self.options.max_chars {
                drafts.push(Draft { section: section.to_string(), text: std::mem::take(&mut current) });
            }
            if !current.is_empty() {
                current.push_str("\n\n");
            }
            current.push_str(&paragraph);
        }
        if !current.is_empty() {
            drafts.push(Draft { section: section.to_string(), text: current });
        }
    }

    fn windows(&self, title: &str, pages: &[&str]) -> Vec<Draft> {
        let text = pages
            .iter()
            .flat_map(|page| page.lines())
            .filter(|line| !sections::is_boilerplate_line(line))
            .collect::<Vec<_>>()
            .join(" ");

        let size = self.options.window_chars.max(1);
        let config = ChunkConfig::new(size)
            .with_overlap(self.options.overlap_chars.min(size - 1))
            .unwrap_or_else(|_| ChunkConfig::new(size));
        TextSplitter::new(config)
            .chunks(&text)
            .map(|window| Draft { section: title.to_string(), text: window.to_string() })
            .collect()
    }
}

/// Convenience wrapper with default options.
pub fn chunk(document: &SourceDocument) -> Vec<Passage> {
    Chunker::default().chunk(document)
}

fn parse_blocks(page: &str) -> Vec<Block> {
    let lines: Vec<&str> =
        page.lines().filter(|line| line.trim().is_empty() || !sections::is_boilerplate_line(line)).collect();
    let mut blocks = Vec::new();
    let mut paragraph: Vec<&str> = Vec::new();
    let mut index = 0;

    let flush = |paragraph: &mut Vec<&str>, blocks: &mut Vec<Block>| {
        if !paragraph.is_empty() {
            blocks.push(Block::Paragraph(paragraph.join(" ")));
            paragraph.clear();
        }
    };

    while index < lines.len() {
        let line = lines[index];
        let trimmed = line.trim();

        if trimmed.is_empty() {
            flush(&mut paragraph, &mut blocks);
            index += 1;
            continue;
        }

        if let Some((table, consumed)) = table::detect(&lines, index) {
            // A single short line right above a table is its caption.
            let caption = match paragraph.as_slice() {
                [only] if only.split_whitespace().count() <= 12 => Some(only.trim().to_string()),
                _ => None,
            };
            if caption.is_some() {
                paragraph.clear();
            }
            flush(&mut paragraph, &mut blocks);
            blocks.push(Block::Table { caption, table });
            index += consumed;
            continue;
        }

        if let Some((pair, consumed)) = qa::detect(&lines, index) {
            flush(&mut paragraph, &mut blocks);
            blocks.push(Block::Qa(pair));
            index += consumed;
            continue;
        }

        if let Some(label) = sections::header_label(trimmed) {
            flush(&mut paragraph, &mut blocks);
            blocks.push(Block::Heading(label));
            index += 1;
            continue;
        }

        paragraph.push(trimmed);
        index += 1;
    }
    flush(&mut paragraph, &mut blocks);
    blocks
}

fn classify(document: &SourceDocument, section: &str, text: &str) -> Category {
    Category::normalize(section)
        .or_else(|| Category::normalize(&document.title))
        .or_else(|| document.category_hint.as_deref().and_then(Category::normalize))
        .or_else(|| Category::normalize(text))
        .unwrap_or(Category::GeneralSupport)
}

fn passage_id(source_id: &str, ordinal: usize, text: &str) -> PassageId {
    let mut hasher = blake3::Hasher::new();
    hasher.update(source_id.as_bytes());
    hasher.update(b"|");
    hasher.update(ordinal.to_string().as_bytes());
    hasher.update(b"|");
    hasher.update(text.as_bytes());
    let hex = hasher.finalize().to_hex();
    PassageId(format!("psg_{}", &hex.as_str()[..16]))
}

fn build_passage(document: &SourceDocument, ordinal: usize, draft: Draft) -> Passage {
    let category = classify(document, &draft.section, &draft.text);
    let keywords = keywords::extract(&draft.text, &draft.section, category);
    Passage {
        id: passage_id(&document.source_id, ordinal, &draft.text),
        language: detect_language(&draft.text),
        category,
        section: draft.section,
        keywords,
        text: draft.text,
    }
}
