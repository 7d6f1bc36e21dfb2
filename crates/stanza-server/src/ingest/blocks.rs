//! Portable-text block schema and HTML conversion
//!
//! Single source of truth for the post `content` field: the block types
//! here are what the mapper serializes and what this converter emits, so
//! the studio schema and the importer cannot drift apart.
//!
//! The converter walks the body's HTML and produces blocks in document
//! order. Paragraphs, headings, quotes and lists become text blocks;
//! `<img>` becomes an image block; YouTube iframes become a `youtube`
//! object block. Inline markup becomes span decorators and mark
//! definitions. Unsupported tags degrade to plain text spans — nothing is
//! silently dropped.

use ego_tree::NodeRef;
use scraper::{ElementRef, Html, Node};
use serde::{Deserialize, Serialize};

use crate::cms::types::{ImageRef, Reference};

/// Span decorators accepted by the post schema's content field.
pub const DECORATORS: &[&str] = &[
    "strong",
    "em",
    "underline",
    "strike-through",
    "code",
    "left-text",
    "center-text",
    "right-text",
];

/// One element of the post `content` array
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "_type")]
pub enum Block {
    #[serde(rename = "block")]
    Text(TextBlock),
    #[serde(rename = "image")]
    Image(ImageBlock),
    #[serde(rename = "youtube")]
    YouTube(YouTubeBlock),
    /// Editor-placed promotional image. Never produced by the converter,
    /// but posts edited in the studio carry them.
    #[serde(rename = "Banner")]
    Banner(BannerBlock),
    #[serde(rename = "Banners")]
    BannerPair(BannersBlock),
}

/// A styled run of spans (paragraph, heading, quote, list item)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextBlock {
    #[serde(rename = "_key")]
    pub key: String,
    pub style: String,
    #[serde(rename = "listItem", skip_serializing_if = "Option::is_none")]
    pub list_item: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub level: Option<u32>,
    #[serde(rename = "markDefs")]
    pub mark_defs: Vec<MarkDef>,
    pub children: Vec<Span>,
}

impl TextBlock {
    fn new(style: &str) -> Self {
        Self {
            key: make_key(),
            style: style.to_string(),
            list_item: None,
            level: None,
            mark_defs: Vec::new(),
            children: Vec::new(),
        }
    }

    /// A fresh block continuing this one's style and mark definitions,
    /// used when an embedded object splits a text run.
    fn continuation(&self) -> Self {
        Self {
            key: make_key(),
            style: self.style.clone(),
            list_item: self.list_item.clone(),
            level: self.level,
            mark_defs: self.mark_defs.clone(),
            children: Vec::new(),
        }
    }
}

/// A run of text with its active marks
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Span {
    #[serde(rename = "_type")]
    pub kind: String,
    #[serde(rename = "_key")]
    pub key: String,
    pub text: String,
    /// Decorator values plus mark-definition keys.
    pub marks: Vec<String>,
}

impl Span {
    fn new(text: String, marks: Vec<String>) -> Self {
        Self {
            kind: "span".to_string(),
            key: make_key(),
            text,
            marks,
        }
    }
}

/// An annotation attached to spans by key
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "_type")]
pub enum MarkDef {
    #[serde(rename = "link")]
    Link {
        #[serde(rename = "_key")]
        key: String,
        href: String,
    },
    /// Site-relative links point at another post by slug.
    #[serde(rename = "internalLink")]
    InternalLink {
        #[serde(rename = "_key")]
        key: String,
        slug: String,
    },
}

impl MarkDef {
    pub fn key(&self) -> &str {
        match self {
            MarkDef::Link { key, .. } | MarkDef::InternalLink { key, .. } => key,
        }
    }
}

/// An embedded image
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageBlock {
    #[serde(rename = "_key")]
    pub key: String,
    /// Deferred-upload convention: the source URL rides along as
    /// `image@<url>` for the studio to resolve into an asset.
    #[serde(rename = "_sanityAsset")]
    pub sanity_asset: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alt: Option<String>,
}

/// An embedded YouTube video
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct YouTubeBlock {
    #[serde(rename = "_key")]
    pub key: String,
    pub url: String,
}

/// A single linked banner image
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BannerBlock {
    #[serde(rename = "_key")]
    pub key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub asset: Option<Reference>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
}

/// A responsive banner with separate desktop and mobile images
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BannersBlock {
    #[serde(rename = "_key")]
    pub key: String,
    #[serde(rename = "DesktopImage", default, skip_serializing_if = "Option::is_none")]
    pub desktop_image: Option<ImageRef>,
    #[serde(rename = "MobileImage", default, skip_serializing_if = "Option::is_none")]
    pub mobile_image: Option<ImageRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
}

fn make_key() -> String {
    let mut key = uuid::Uuid::new_v4().simple().to_string();
    key.truncate(12);
    key
}

/// Convert body HTML into portable-text blocks
pub fn html_to_blocks(html: &str) -> Vec<Block> {
    let fragment = Html::parse_fragment(html);
    let mut converter = Converter { blocks: Vec::new() };

    for child in fragment.root_element().children() {
        converter.walk_block(child, None, 1);
    }

    converter.blocks
}

struct Converter {
    blocks: Vec<Block>,
}

impl Converter {
    /// Handle one node in block position.
    fn walk_block(
        &mut self,
        node: NodeRef<'_, Node>,
        list: Option<&'static str>,
        level: u32,
    ) {
        match node.value() {
            Node::Text(text) => {
                // Loose text outside any element becomes its own paragraph.
                let trimmed = text.trim();
                if !trimmed.is_empty() {
                    let mut block = TextBlock::new("normal");
                    block.children.push(Span::new(trimmed.to_string(), Vec::new()));
                    self.blocks.push(Block::Text(block));
                }
            },
            Node::Element(_) => {
                let element = match ElementRef::wrap(node) {
                    Some(element) => element,
                    None => return,
                };

                match element.value().name() {
                    "p" => self.emit_text_block(element, "normal", list, level),
                    "h1" | "h2" | "h3" | "h4" | "h5" | "h6" => {
                        let style = element.value().name().to_string();
                        self.emit_text_block(element, &style, list, level);
                    },
                    "blockquote" => self.emit_text_block(element, "blockquote", list, level),
                    "ul" => self.walk_list(element, "bullet", level),
                    "ol" => self.walk_list(element, "number", level),
                    "img" => self.push_image(element),
                    "iframe" => self.push_embed(element),
                    "br" | "hr" => {},
                    // Containers contribute their children in order.
                    "div" | "section" | "article" | "body" | "html" => {
                        for child in element.children() {
                            self.walk_block(child, list, level);
                        }
                    },
                    // Anything else degrades to a plain paragraph of its
                    // text content.
                    _ => self.emit_text_block(element, "normal", list, level),
                }
            },
            _ => {},
        }
    }

    fn walk_list(&mut self, element: ElementRef<'_>, kind: &'static str, level: u32) {
        for child in element.children() {
            if let Some(item) = ElementRef::wrap(child) {
                if item.value().name() == "li" {
                    self.emit_text_block(item, "normal", Some(kind), level);
                    // Nested lists inside the item deepen the level.
                    for grandchild in item.children() {
                        if let Some(nested) = ElementRef::wrap(grandchild) {
                            match nested.value().name() {
                                "ul" => self.walk_list(nested, "bullet", level + 1),
                                "ol" => self.walk_list(nested, "number", level + 1),
                                _ => {},
                            }
                        }
                    }
                }
            }
        }
    }

    fn emit_text_block(
        &mut self,
        element: ElementRef<'_>,
        style: &str,
        list: Option<&'static str>,
        level: u32,
    ) {
        let mut block = TextBlock::new(style);
        if let Some(kind) = list {
            block.list_item = Some(kind.to_string());
            block.level = Some(level);
        }

        let mut active = Vec::new();
        if let Some(mark) = alignment_mark(element) {
            active.push(mark.to_string());
        }

        for child in element.children() {
            self.collect_inline(child, &mut active, &mut block);
        }

        self.flush(block);
    }

    fn flush(&mut self, block: TextBlock) {
        if !block.children.is_empty() {
            self.blocks.push(Block::Text(block));
        }
    }

    /// Handle one node in inline position, accumulating spans into `block`.
    fn collect_inline(
        &mut self,
        node: NodeRef<'_, Node>,
        active: &mut Vec<String>,
        block: &mut TextBlock,
    ) {
        match node.value() {
            Node::Text(text) => {
                if text.trim().is_empty() {
                    // Collapse whitespace-only runs into a separating space.
                    if let Some(last) = block.children.last_mut() {
                        if !last.text.ends_with(' ') {
                            last.text.push(' ');
                        }
                    }
                } else {
                    block
                        .children
                        .push(Span::new(text.to_string(), active.clone()));
                }
            },
            Node::Element(_) => {
                let element = match ElementRef::wrap(node) {
                    Some(element) => element,
                    None => return,
                };

                match element.value().name() {
                    "br" => block.children.push(Span::new("\n".to_string(), active.clone())),
                    "img" => {
                        // An embedded object splits the text run so block
                        // ordering is preserved.
                        let continuation = block.continuation();
                        let finished = std::mem::replace(block, continuation);
                        self.flush(finished);
                        self.push_image(element);
                    },
                    "iframe" => {
                        let continuation = block.continuation();
                        let finished = std::mem::replace(block, continuation);
                        self.flush(finished);
                        self.push_embed(element);
                    },
                    // Nested lists are emitted as their own blocks by the
                    // block-level walk, not as inline text.
                    "ul" | "ol" => {},
                    "a" => {
                        let mark_def = match element.value().attr("href") {
                            Some(href) if href.starts_with('/') => MarkDef::InternalLink {
                                key: make_key(),
                                slug: href.trim_matches('/').to_string(),
                            },
                            Some(href) => MarkDef::Link {
                                key: make_key(),
                                href: href.to_string(),
                            },
                            // An anchor with no target degrades to text.
                            None => {
                                self.collect_children(element, active, block);
                                return;
                            },
                        };

                        active.push(mark_def.key().to_string());
                        block.mark_defs.push(mark_def);
                        self.collect_children(element, active, block);
                        active.pop();
                    },
                    name => {
                        let decorator = decorator_for_tag(name)
                            .map(str::to_string)
                            .or_else(|| alignment_mark(element).map(str::to_string));

                        match decorator {
                            Some(mark) => {
                                active.push(mark);
                                self.collect_children(element, active, block);
                                active.pop();
                            },
                            // Unrecognized inline markup degrades to plain
                            // text, never dropped.
                            None => self.collect_children(element, active, block),
                        }
                    },
                }
            },
            _ => {},
        }
    }

    fn collect_children(
        &mut self,
        element: ElementRef<'_>,
        active: &mut Vec<String>,
        block: &mut TextBlock,
    ) {
        for child in element.children() {
            self.collect_inline(child, active, block);
        }
    }

    fn push_image(&mut self, element: ElementRef<'_>) {
        if let Some(src) = element.value().attr("src") {
            self.blocks.push(Block::Image(ImageBlock {
                key: make_key(),
                sanity_asset: format!("image@{src}"),
                alt: element.value().attr("alt").map(str::to_string),
            }));
        }
    }

    fn push_embed(&mut self, element: ElementRef<'_>) {
        let src = match element.value().attr("src") {
            Some(src) => src,
            None => return,
        };

        if src.contains("youtube.com") || src.contains("youtu.be") {
            self.blocks.push(Block::YouTube(YouTubeBlock {
                key: make_key(),
                url: src.to_string(),
            }));
        } else {
            tracing::debug!(src = %src, "Skipping unrecognized embed");
        }
    }
}

fn decorator_for_tag(name: &str) -> Option<&'static str> {
    match name {
        "strong" | "b" => Some("strong"),
        "em" | "i" => Some("em"),
        "u" => Some("underline"),
        "s" | "del" | "strike" => Some("strike-through"),
        "code" => Some("code"),
        _ => None,
    }
}

/// Alignment arrives either as a `text-align` inline style or as one of
/// the decorator class names.
fn alignment_mark(element: ElementRef<'_>) -> Option<&'static str> {
    if let Some(class) = element.value().attr("class") {
        for name in class.split_ascii_whitespace() {
            match name {
                "left-text" => return Some("left-text"),
                "center-text" => return Some("center-text"),
                "right-text" => return Some("right-text"),
                _ => {},
            }
        }
    }

    let style = element.value().attr("style")?.to_ascii_lowercase();
    let style = style.replace(' ', "");
    if style.contains("text-align:center") {
        Some("center-text")
    } else if style.contains("text-align:right") {
        Some("right-text")
    } else if style.contains("text-align:left") {
        Some("left-text")
    } else {
        None
    }
}
