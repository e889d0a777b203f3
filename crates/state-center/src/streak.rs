use scriptflow_core_types::Run;

/// Number of failed runs at the head of a newest-first sequence.
///
/// Counting stops at the first run that did not fail; a run still in
/// progress ends the streak too.
pub fn consecutive_failures<'a, I>(runs: I) -> usize
where
    I: IntoIterator<Item = &'a Run>,
{
    runs.into_iter()
        .take_while(|run| run.status.is_failure())
        .count()
}
