//! Book assembly: filtering and ordering raw storage listings into pages.

mod order;

pub use order::{Token, is_supported_image, natural_cmp, tokenize};

use crate::types::{PageImage, PageKey};

/// Turn a raw `(key, file name)` listing into ordered pages.
///
/// Non-image names are dropped, the remainder sorted by natural name
/// comparison, and 1-based sequence indices assigned in that order.
pub fn order_pages(listing: Vec<(PageKey, String)>) -> Vec<PageImage> {
    let mut entries: Vec<(PageKey, String)> =
        listing.into_iter().filter(|(_, name)| is_supported_image(name)).collect();

    entries.sort_by(|(_, a), (_, b)| order::natural_cmp_name(a, b));

    entries
        .into_iter()
        .enumerate()
        .map(|(index, (key, name))| PageImage {
            key,
            name,
            sequence_index: index as u32 + 1,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn listing(names: &[&str]) -> Vec<(PageKey, String)> {
        names
            .iter()
            .enumerate()
            .map(|(i, name)| (PageKey::new(format!("id-{i}")), name.to_string()))
            .collect()
    }

    #[test]
    fn filters_and_sorts_pages() {
        let pages = order_pages(listing(&["10.jpg", "2.png", "001.jpeg", "cover.webp", "notes.txt"]));

        let order: Vec<&str> = pages.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(order, vec!["001.jpeg", "2.png", "10.jpg", "cover.webp"]);
        assert_eq!(pages[0].sequence_index, 1);
        assert_eq!(pages[3].sequence_index, 4);
    }

    #[test]
    fn indices_are_dense_after_filtering() {
        let pages = order_pages(listing(&["b.gif", "readme.md", "a.png"]));
        let indices: Vec<u32> = pages.iter().map(|p| p.sequence_index).collect();
        assert_eq!(indices, vec![1, 2]);
    }
}
