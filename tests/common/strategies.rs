use proptest::prelude::*;
use switchyard::execution::TaskPriority;

pub fn priority_strategy() -> impl Strategy<Value = TaskPriority> {
    prop_oneof![
        Just(TaskPriority::Critical),
        Just(TaskPriority::High),
        Just(TaskPriority::Normal),
        Just(TaskPriority::Low),
        Just(TaskPriority::Background),
    ]
}

/// Sequence of submissions, each a priority tagged with its submission index
pub fn submission_strategy(max_len: usize) -> impl Strategy<Value = Vec<(TaskPriority, usize)>> {
    prop::collection::vec(priority_strategy(), 0..max_len)
        .prop_map(|priorities| priorities.into_iter().enumerate().map(|(i, p)| (p, i)).collect())
}
