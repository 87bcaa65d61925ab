//! Result windows

/// A view on a result set
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    /// Zero based index of the first item
    pub offset: usize,
    /// Maximum number of items, negative for no limit
    pub limit: i64,
}

impl Window {
    pub fn new(offset: usize, limit: i64) -> Self {
        Self { offset, limit }
    }

    /// Build a window from pagination parameters.
    ///
    /// A negative `per_page` means no pagination: there is no window unless
    /// `skip` is positive. Otherwise `page` is clamped to 1 and `skip` to 0.
    /// Offsets past `usize::MAX` saturate.
    pub fn page(page: i64, per_page: i64, skip: i64) -> Option<Window> {
        if per_page < 0 {
            if skip > 0 {
                return Some(Window::new(skip as usize, per_page));
            }
            return None;
        }
        let page = page.max(1);
        let skip = skip.max(0);
        let offset = (page - 1).saturating_mul(per_page).saturating_add(skip);
        Some(Window::new(usize::try_from(offset).unwrap_or(usize::MAX), per_page))
    }

    /// Keep the items falling in the window
    pub fn apply<T>(&self, items: Vec<T>) -> Vec<T> {
        let items = items.into_iter().skip(self.offset);
        if self.limit < 0 {
            items.collect()
        } else {
            items.take(self.limit as usize).collect()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page() {
        assert_eq!(Window::page(1, 20, 0), Some(Window::new(0, 20)));
        assert_eq!(Window::page(3, 10, 5), Some(Window::new(25, 10)));
        assert_eq!(Window::page(0, 10, -3), Some(Window::new(0, 10)));
        assert_eq!(Window::page(1, 0, 0), Some(Window::new(0, 0)));
    }

    #[test]
    fn test_page_unlimited() {
        assert_eq!(Window::page(0, -1, 5), Some(Window::new(5, -1)));
        assert_eq!(Window::page(4, -1, 0), None);
    }

    #[test]
    fn test_page_saturates() {
        let window = Window::page(i64::MAX, 10, 0).unwrap();
        assert_eq!(window.limit, 10);
        assert_eq!(window.offset as u64, i64::MAX as u64);
        assert_eq!(window.apply(vec![1, 2, 3]), Vec::<i32>::new());

        let window = Window::page(2, i64::MAX, i64::MAX).unwrap();
        assert_eq!(window.offset as u64, i64::MAX as u64);
    }

    #[test]
    fn test_apply() {
        let items: Vec<i32> = (0..10).collect();
        assert_eq!(Window::new(2, 3).apply(items.clone()), vec![2, 3, 4]);
        assert_eq!(Window::new(8, -1).apply(items.clone()), vec![8, 9]);
        assert!(Window::new(20, 5).apply(items).is_empty());
    }
}
