#[test]
fn pathtrace_wgsl_parses_successfully() {
    parse_wgsl("pathtrace.wgsl", include_str!("pathtrace.wgsl"));
}

fn parse_wgsl(label: &str, source: &str) {
    naga::front::wgsl::parse_str(source).unwrap_or_else(|error| {
        panic!(
            "WGSL parse failed for {label}: {}",
            error.emit_to_string(source)
        )
    });
}
