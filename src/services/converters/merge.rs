use crate::services::compressor::file_label;
use crate::services::error::{ConvertError, ConvertResult};
use lopdf::{Document, Object, ObjectId, dictionary};
use std::path::{Path, PathBuf};
use tracing::info;

/// Page attributes a page may inherit from its ancestors in the page tree.
const INHERITABLE_KEYS: [&[u8]; 4] = [b"MediaBox", b"CropBox", b"Resources", b"Rotate"];

/// Guards against cyclic `Parent` chains in malformed files.
const MAX_TREE_DEPTH: usize = 64;

/// Concatenates the pages of `inputs`, in order, into one PDF.
///
/// Every input is parsed before anything is written: one invalid file fails the
/// whole merge and no output is produced.
pub fn merge_pdfs(inputs: &[PathBuf], output: &Path) -> ConvertResult<usize> {
    if inputs.is_empty() {
        return Err(ConvertError::BadRequest(
            "At least one PDF is required".to_string(),
        ));
    }

    let documents = inputs
        .iter()
        .map(|path| {
            Document::load(path).map_err(|e| {
                ConvertError::Conversion(format!("{} is not a valid PDF: {}", file_label(path), e))
            })
        })
        .collect::<ConvertResult<Vec<_>>>()?;

    let (mut merged, page_count) = merge_documents(documents)?;
    merged.save(output).map_err(|e| {
        ConvertError::Conversion(format!("Failed to write {}: {}", file_label(output), e))
    })?;

    info!("📚 Merged {} PDFs into {} pages", inputs.len(), page_count);
    Ok(page_count)
}

fn merge_documents(documents: Vec<Document>) -> ConvertResult<(Document, usize)> {
    let mut merged = Document::with_version("1.5");
    let mut next_id = 1;
    let mut page_ids: Vec<ObjectId> = Vec::new();

    for mut doc in documents {
        doc.renumber_objects_with(next_id);
        next_id = doc.max_id + 1;

        // get_pages is keyed by page number, so this is document order
        let pages: Vec<ObjectId> = doc.get_pages().into_values().collect();
        for page_id in &pages {
            let inherited = inherited_attributes(&doc, *page_id);
            if let Ok(page) = doc.get_object_mut(*page_id).and_then(Object::as_dict_mut) {
                for (key, value) in inherited {
                    page.set(key, value);
                }
            }
        }
        page_ids.extend(pages);

        // The page tree and catalog are rebuilt below
        for (id, object) in doc.objects {
            match object.type_name().unwrap_or_default() {
                b"Catalog" | b"Pages" | b"Outlines" | b"Outline" => {}
                _ => {
                    merged.objects.insert(id, object);
                }
            }
        }
    }

    if page_ids.is_empty() {
        return Err(ConvertError::Conversion(
            "Input PDFs contain no pages".to_string(),
        ));
    }

    let pages_id: ObjectId = (next_id, 0);
    merged.max_id = next_id;

    for page_id in &page_ids {
        let page = merged
            .get_object_mut(*page_id)
            .and_then(Object::as_dict_mut)
            .map_err(|e| ConvertError::Conversion(format!("Page object {:?} lost: {}", page_id, e)))?;
        page.set("Parent", pages_id);
    }

    let kids: Vec<Object> = page_ids.iter().map(|id| Object::Reference(*id)).collect();
    merged.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => page_ids.len() as i64,
        }),
    );

    let catalog_id = merged.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    merged.trailer.set("Root", catalog_id);

    Ok((merged, page_ids.len()))
}

/// Attributes missing on the page itself but set on an ancestor `Pages` node.
fn inherited_attributes(doc: &Document, page_id: ObjectId) -> Vec<(Vec<u8>, Object)> {
    let Ok(page) = doc.get_dictionary(page_id) else {
        return Vec::new();
    };

    let mut missing: Vec<&[u8]> = INHERITABLE_KEYS
        .iter()
        .copied()
        .filter(|key| !page.has(key))
        .collect();
    let mut found = Vec::new();
    let mut parent = page.get(b"Parent").and_then(Object::as_reference).ok();

    for _ in 0..MAX_TREE_DEPTH {
        let Some(parent_id) = parent else { break };
        if missing.is_empty() {
            break;
        }
        let Ok(node) = doc.get_dictionary(parent_id) else {
            break;
        };

        missing.retain(|key| match node.get(key) {
            Ok(value) => {
                found.push((key.to_vec(), value.clone()));
                false
            }
            Err(_) => true,
        });
        parent = node.get(b"Parent").and_then(Object::as_reference).ok();
    }

    found
}
