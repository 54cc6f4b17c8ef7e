pub(crate) fn default_font_size() -> u32 {
    16
}

pub(crate) fn default_line_height() -> f32 {
    1.6
}

pub(crate) fn default_margin() -> u32 {
    16
}

pub(crate) fn default_cache_enabled() -> bool {
    true
}

pub(crate) fn default_cache_max_entries() -> usize {
    crate::cache::DEFAULT_MAX_ENTRIES
}

pub(crate) fn default_cache_max_total_bytes() -> u64 {
    crate::cache::DEFAULT_MAX_TOTAL_BYTES
}

pub(crate) fn default_cache_max_entry_bytes() -> u64 {
    crate::cache::DEFAULT_MAX_ENTRY_BYTES
}

pub(crate) fn default_cache_dir() -> String {
    ".cache/chapters".to_string()
}

pub(crate) fn default_log_level() -> crate::config::LogLevel {
    crate::config::LogLevel::Debug
}
