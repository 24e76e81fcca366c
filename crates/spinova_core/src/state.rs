use crate::view_model::AppViewModel;

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AppState {
    url_input: String,
    format_name: Option<String>,
    busy: bool,
    status: String,
    percent: u8,
    log: Vec<String>,
    show_bytes: bool,
    success_count: usize,
    error_count: usize,
    dirty: bool,
}

impl AppState {
    pub fn new() -> Self {
        Self {
            show_bytes: true,
            ..Self::default()
        }
    }

    /// Initial state with a preselected format display name.
    pub fn with_format(format_name: impl Into<String>) -> Self {
        Self {
            format_name: Some(format_name.into()),
            ..Self::new()
        }
    }

    pub fn view(&self) -> AppViewModel {
        AppViewModel {
            busy: self.busy,
            status: self.status.clone(),
            percent: self.percent,
            log: self.log.clone(),
            success_count: self.success_count,
            error_count: self.error_count,
            dirty: self.dirty,
        }
    }

    /// Returns whether the state changed since the last call and clears the flag.
    pub fn consume_dirty(&mut self) -> bool {
        std::mem::take(&mut self.dirty)
    }

    pub fn set_show_bytes(&mut self, show: bool) {
        self.show_bytes = show;
    }

    pub(crate) fn show_bytes(&self) -> bool {
        self.show_bytes
    }

    pub(crate) fn is_busy(&self) -> bool {
        self.busy
    }

    pub(crate) fn url_input(&self) -> &str {
        &self.url_input
    }

    pub(crate) fn set_url_input(&mut self, url: String) {
        self.url_input = url;
    }

    pub(crate) fn format_name(&self) -> String {
        self.format_name.clone().unwrap_or_default()
    }

    pub(crate) fn set_format_name(&mut self, name: String) {
        self.format_name = Some(name);
        self.dirty = true;
    }

    pub(crate) fn begin_run(&mut self, status: String) {
        self.busy = true;
        self.percent = 0;
        self.success_count = 0;
        self.error_count = 0;
        self.log.clear();
        self.set_status(status);
    }

    pub(crate) fn end_run(&mut self) {
        self.busy = false;
        self.dirty = true;
    }

    pub(crate) fn set_status(&mut self, status: String) {
        self.status = status;
        self.dirty = true;
    }

    pub(crate) fn set_percent(&mut self, percent: u8) {
        self.percent = percent;
        self.dirty = true;
    }

    pub(crate) fn push_log(&mut self, line: String) {
        self.status = line.clone();
        self.log.push(line);
        self.dirty = true;
    }

    pub(crate) fn count_success(&mut self) {
        self.success_count += 1;
    }

    pub(crate) fn count_error(&mut self) {
        self.error_count += 1;
    }

    pub(crate) fn tally(&self) -> (usize, usize) {
        (self.success_count, self.error_count)
    }
}
