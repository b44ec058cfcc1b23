//! Outline (bookmark) tree walker over a lopdf document.
//!
//! Items are visited through `First`/`Next` links in reading order; children
//! sit one level below their parent. Destinations may be explicit arrays,
//! named destinations (legacy `/Dests` or the `/Names` tree) or `GoTo`
//! actions. Items that cannot be resolved are logged and dropped while the
//! rest of the tree is still read.

use crate::error::ExtractError;
use crate::extractor::decode_text_string;
use crate::models::OutlineEntry;
use lopdf::{Dictionary, Document, Object, ObjectId};
use std::collections::{HashMap, HashSet};
use tracing::debug;

const MAX_INDIRECTION: usize = 32;

pub(crate) struct OutlineWalker<'a> {
    document: &'a Document,
    pages: &'a HashMap<ObjectId, u32>,
    visited: HashSet<ObjectId>,
    entries: Vec<OutlineEntry>,
}

impl<'a> OutlineWalker<'a> {
    /// `pages` maps page object ids to 1-based page numbers.
    pub(crate) fn new(document: &'a Document, pages: &'a HashMap<ObjectId, u32>) -> Self {
        Self {
            document,
            pages,
            visited: HashSet::new(),
            entries: Vec::new(),
        }
    }

    /// Entries in reading order; empty when the document has no outline.
    pub(crate) fn walk(mut self) -> Vec<OutlineEntry> {
        let first = match self.first_item() {
            Ok(Some(first)) => first,
            Ok(None) => return Vec::new(),
            Err(error) => {
                debug!(%error, "document has no readable outline");
                return Vec::new();
            }
        };

        self.walk_siblings(first, 1);
        self.entries
    }

    fn first_item(&self) -> Result<Option<&'a Object>, ExtractError> {
        let catalog = self.catalog()?;
        let Ok(outlines) = catalog.get(b"Outlines") else {
            return Ok(None);
        };
        Ok(self.dictionary(outlines)?.get(b"First").ok())
    }

    fn walk_siblings(&mut self, first: &'a Object, level: u32) {
        let mut current = Some(first);

        while let Some(object) = current {
            if let Object::Reference(id) = object {
                if !self.visited.insert(*id) {
                    debug!(?id, level, "outline item visited twice, stopping branch");
                    return;
                }
            }

            let item = match self.dictionary(object) {
                Ok(item) => item,
                Err(error) => {
                    debug!(%error, level, "outline item is not a dictionary, stopping branch");
                    return;
                }
            };

            match self.entry(item, level) {
                Ok(entry) => self.entries.push(entry),
                Err(error) => debug!(%error, level, "dropped outline item"),
            }

            if let Ok(child) = item.get(b"First") {
                self.walk_siblings(child, level + 1);
            }
            current = item.get(b"Next").ok();
        }
    }

    fn entry(&self, item: &'a Dictionary, level: u32) -> Result<OutlineEntry, ExtractError> {
        let raw_title = item
            .get(b"Title")
            .map_err(|_| malformed("outline item has no title"))?;
        let title = self.string(raw_title)?;
        let page = self
            .item_page(item)
            .map_err(|error| malformed(format!("{title:?}: {error}")))?;

        Ok(OutlineEntry::new(level, title.trim(), page))
    }

    fn item_page(&self, item: &'a Dictionary) -> Result<u32, ExtractError> {
        if let Ok(destination) = item.get(b"Dest") {
            return self.destination_page(destination, 0);
        }

        let action = item
            .get(b"A")
            .map_err(|_| malformed("outline item has no destination"))?;
        let action = self.dictionary(action)?;
        let kind = action
            .get(b"S")
            .and_then(Object::as_name)
            .map_err(|_| malformed("action has no type"))?;
        if kind != b"GoTo" {
            return Err(malformed(format!(
                "unsupported action {}",
                String::from_utf8_lossy(kind)
            )));
        }

        let destination = action
            .get(b"D")
            .map_err(|_| malformed("GoTo action has no destination"))?;
        self.destination_page(destination, 0)
    }

    fn destination_page(&self, destination: &'a Object, depth: usize) -> Result<u32, ExtractError> {
        if depth > MAX_INDIRECTION {
            return Err(malformed("named destinations nest too deeply"));
        }

        match self.resolve(destination)? {
            Object::Array(items) => self.array_page(items),
            Object::Dictionary(dictionary) => {
                let inner = dictionary
                    .get(b"D")
                    .map_err(|_| malformed("destination dictionary has no D entry"))?;
                self.destination_page(inner, depth + 1)
            }
            Object::Name(name) => {
                let target = self.legacy_named_destination(name)?;
                self.destination_page(target, depth + 1)
            }
            Object::String(name, _) => {
                let target = self.named_destination(name)?;
                self.destination_page(target, depth + 1)
            }
            _ => Err(malformed("unsupported destination object")),
        }
    }

    fn array_page(&self, items: &'a [Object]) -> Result<u32, ExtractError> {
        match items.first() {
            Some(Object::Reference(id)) => self
                .pages
                .get(id)
                .copied()
                .ok_or_else(|| malformed(format!("destination {id:?} is not a page"))),
            // Integer targets are 0-based page indices.
            Some(Object::Integer(index)) => u32::try_from(*index)
                .ok()
                .and_then(|index| index.checked_add(1))
                .ok_or_else(|| malformed(format!("invalid page index {index}"))),
            _ => Err(malformed("destination array has no page")),
        }
    }

    /// PDF 1.1 style: `/Dests` dictionary in the catalog keyed by name.
    fn legacy_named_destination(&self, name: &[u8]) -> Result<&'a Object, ExtractError> {
        let dests = self
            .catalog()?
            .get(b"Dests")
            .map_err(|_| malformed("catalog has no Dests dictionary"))?;
        self.dictionary(dests)?.get(name).map_err(|_| {
            malformed(format!(
                "named destination {} not found",
                String::from_utf8_lossy(name)
            ))
        })
    }

    /// PDF 1.2 style: the `Dests` name tree under the catalog's `/Names`.
    fn named_destination(&self, name: &[u8]) -> Result<&'a Object, ExtractError> {
        let names = self
            .catalog()?
            .get(b"Names")
            .map_err(|_| malformed("catalog has no Names dictionary"))?;
        let root = self
            .dictionary(names)?
            .get(b"Dests")
            .map_err(|_| malformed("Names dictionary has no Dests tree"))?;

        self.lookup_name_tree(self.dictionary(root)?, name, 0)
            .ok_or_else(|| {
                malformed(format!(
                    "named destination {} not found",
                    decode_text_string(name)
                ))
            })
    }

    fn lookup_name_tree(
        &self,
        node: &'a Dictionary,
        key: &[u8],
        depth: usize,
    ) -> Option<&'a Object> {
        if depth > MAX_INDIRECTION {
            return None;
        }

        if let Some(names) = node.get(b"Names").ok().and_then(|names| self.array(names).ok()) {
            for pair in names.chunks_exact(2) {
                let matches = self
                    .resolve(&pair[0])
                    .ok()
                    .and_then(|name| name.as_str().ok())
                    .is_some_and(|name| name == key);
                if matches {
                    return Some(&pair[1]);
                }
            }
        }

        let kids = node.get(b"Kids").ok().and_then(|kids| self.array(kids).ok())?;
        kids.iter()
            .filter_map(|kid| self.dictionary(kid).ok())
            .find_map(|kid| self.lookup_name_tree(kid, key, depth + 1))
    }

    fn catalog(&self) -> Result<&'a Dictionary, ExtractError> {
        let root = self
            .document
            .trailer
            .get(b"Root")
            .map_err(|_| malformed("trailer has no Root"))?;
        self.dictionary(root)
    }

    fn resolve(&self, object: &'a Object) -> Result<&'a Object, ExtractError> {
        let mut current = object;
        for _ in 0..MAX_INDIRECTION {
            match current {
                Object::Reference(id) => {
                    current = self
                        .document
                        .get_object(*id)
                        .map_err(|error| malformed(format!("object {id:?}: {error}")))?;
                }
                _ => return Ok(current),
            }
        }
        Err(malformed("reference chain too long"))
    }

    fn dictionary(&self, object: &'a Object) -> Result<&'a Dictionary, ExtractError> {
        match self.resolve(object)? {
            Object::Dictionary(dictionary) => Ok(dictionary),
            _ => Err(malformed("expected a dictionary")),
        }
    }

    fn array(&self, object: &'a Object) -> Result<&'a [Object], ExtractError> {
        match self.resolve(object)? {
            Object::Array(items) => Ok(items.as_slice()),
            _ => Err(malformed("expected an array")),
        }
    }

    fn string(&self, object: &'a Object) -> Result<String, ExtractError> {
        match self.resolve(object)? {
            Object::String(raw, _) => Ok(decode_text_string(raw)),
            _ => Err(malformed("outline title is not a string")),
        }
    }
}

fn malformed(message: impl Into<String>) -> ExtractError {
    ExtractError::MalformedOutline(message.into())
}
