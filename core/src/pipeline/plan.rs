//! Construction of the background prefetch schedule around a page.

/// Urgency of one prefetch task. Tasks are issued in descending urgency;
/// the coordinator's concurrency bound does the actual throttling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrefetchPriority {
    High,
    Normal,
    Low,
}

/// One page scheduled for background fetching.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PrefetchTask {
    pub page: u32,
    pub priority: PrefetchPriority,
}

/// Compute the prefetch schedule for `current` given the planner's window.
///
/// The next two pages are high priority, the rest of the window normal,
/// and the previous page low priority only when it is not already
/// resident. Pages reported cached are skipped entirely; in-flight
/// duplicates are the coordinator's problem, not ours.
pub fn plan_window(
    current: u32,
    total_pages: u32,
    window: u32,
    is_cached: impl Fn(u32) -> bool,
) -> Vec<PrefetchTask> {
    let mut tasks = Vec::new();
    if total_pages == 0 || current == 0 {
        return tasks;
    }

    let end = current.saturating_add(window).min(total_pages);

    for page in (current + 1)..=end.min(current.saturating_add(2)) {
        if !is_cached(page) {
            tasks.push(PrefetchTask { page, priority: PrefetchPriority::High });
        }
    }

    for page in current.saturating_add(3)..=end {
        if !is_cached(page) {
            tasks.push(PrefetchTask { page, priority: PrefetchPriority::Normal });
        }
    }

    if current > 1 && !is_cached(current - 1) {
        tasks.push(PrefetchTask { page: current - 1, priority: PrefetchPriority::Low });
    }

    tasks
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pages(tasks: &[PrefetchTask]) -> Vec<u32> {
        tasks.iter().map(|t| t.page).collect()
    }

    #[test]
    fn orders_by_urgency() {
        let tasks = plan_window(5, 100, 5, |_| false);
        assert_eq!(pages(&tasks), vec![6, 7, 8, 9, 10, 4]);
        assert_eq!(tasks[0].priority, PrefetchPriority::High);
        assert_eq!(tasks[1].priority, PrefetchPriority::High);
        assert_eq!(tasks[2].priority, PrefetchPriority::Normal);
        assert_eq!(tasks.last().unwrap().priority, PrefetchPriority::Low);
    }

    #[test]
    fn clamps_at_the_end_of_the_book() {
        let tasks = plan_window(99, 100, 5, |_| false);
        assert_eq!(pages(&tasks), vec![100, 98]);
    }

    #[test]
    fn first_page_has_no_backward_task() {
        let tasks = plan_window(1, 10, 3, |_| false);
        assert!(pages(&tasks).iter().all(|&p| p > 1));
    }

    #[test]
    fn cached_pages_are_skipped() {
        let tasks = plan_window(5, 100, 4, |page| page == 6 || page == 4);
        assert_eq!(pages(&tasks), vec![7, 8, 9]);
    }

    #[test]
    fn empty_book_yields_nothing() {
        assert!(plan_window(1, 0, 5, |_| false).is_empty());
    }
}
