use hostname::get;

/// # Host Name
///
/// The hostname of the machine running the process, or `"unknown"` if the OS
/// does not report one.
pub fn host_name() -> String {
    get()
        .map(|name| name.to_string_lossy().trim().to_string())
        .ok()
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| "unknown".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_name_is_never_empty() {
        assert!(!host_name().is_empty());
    }
}
