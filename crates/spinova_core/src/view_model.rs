#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AppViewModel {
    /// True while a job or batch is running; the download action is disabled.
    pub busy: bool,
    pub status: String,
    pub percent: u8,
    pub log: Vec<String>,
    pub success_count: usize,
    pub error_count: usize,
    pub dirty: bool,
}
