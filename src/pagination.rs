//! Feed pagination. Ten posts per page, remainder on the last page.

pub const POSTS_PER_PAGE: usize = 10;

#[derive(Debug)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub number: usize,
    pub num_pages: usize,
    pub total: usize,
}

impl<T> Page<T> {
    pub fn has_previous(&self) -> bool {
        self.number > 1
    }

    pub fn has_next(&self) -> bool {
        self.number < self.num_pages
    }

    pub fn previous_number(&self) -> usize {
        self.number - 1
    }

    pub fn next_number(&self) -> usize {
        self.number + 1
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Slice `items` into page `number` (1-based). Out-of-range numbers clamp to
/// the nearest valid page; an empty listing still yields page 1 of 1.
pub fn paginate<T>(items: Vec<T>, number: usize, per_page: usize) -> Page<T> {
    let total = items.len();
    let num_pages = if total == 0 {
        1
    } else {
        total.div_ceil(per_page)
    };
    let number = number.clamp(1, num_pages);
    let items: Vec<T> = items
        .into_iter()
        .skip((number - 1) * per_page)
        .take(per_page)
        .collect();
    Page {
        items,
        number,
        num_pages,
        total,
    }
}
