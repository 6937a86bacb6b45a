//! Minimal valid PDFs built in memory.

use lopdf::{dictionary, Document, Object, Stream};

/// `page_count` US-Letter pages with empty content.
pub fn blank_pdf(page_count: u32) -> Vec<u8> {
    let sizes = vec![(612, 792); page_count as usize];
    pdf_with_page_sizes(&sizes)
}

/// One page per `(width_pt, height_pt)` entry.
pub fn pdf_with_page_sizes(sizes: &[(i64, i64)]) -> Vec<u8> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();

    let mut kids = Vec::with_capacity(sizes.len());
    for &(width, height) in sizes {
        let content_id = doc.add_object(Stream::new(dictionary! {}, Vec::new()));
        let media_box = vec![
            Object::Integer(0),
            Object::Integer(0),
            Object::Integer(width),
            Object::Integer(height),
        ];
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
            "MediaBox" => media_box
        });
        kids.push(Object::Reference(page_id));
    }

    let pages = dictionary! {
        "Type" => "Pages",
        "Kids" => kids,
        "Count" => sizes.len() as i64
    };
    doc.objects.insert(pages_id, Object::Dictionary(pages));

    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id
    });
    doc.trailer.set("Root", catalog_id);

    let mut bytes = Vec::new();
    if let Err(err) = doc.save_to(&mut bytes) {
        panic!("in-memory PDF should serialize: {err}");
    }
    bytes
}
