#![no_main]
use libfuzzer_sys::fuzz_target;
use selene::pipe::Sample;

fuzz_target!(|data: &[u8]| {
    let text = String::from_utf8_lossy(data);
    let mid = text
        .char_indices()
        .nth(text.chars().count() / 2)
        .map_or(text.len(), |(i, _)| i);
    let (key, title) = text.split_at(mid);

    let sample = Sample::new(Some(0), key, f64::from(data.len() as u32));
    let line = selene::influx::line(&sample, Some(title));

    // Escaped tags never introduce unescaped separators before the field set
    assert!(line.contains(" value="));
});
