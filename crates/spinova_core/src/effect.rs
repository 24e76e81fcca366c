#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    StartJob { url: String, format_name: String },
    StartBatch { urls: Vec<String>, format_name: String },
    Cancel,
}
