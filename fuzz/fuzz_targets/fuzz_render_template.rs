#![no_main]
use libfuzzer_sys::fuzz_target;
use std::collections::HashMap;

fuzz_target!(|data: &[u8]| {
    let Ok(template) = std::str::from_utf8(data) else {
        return;
    };

    let mut values = HashMap::new();
    values.insert("socCharge".to_string(), 64.25);
    values.insert("chargePower".to_string(), -11000.0);

    // Malformed placeholders must fail cleanly
    let _ = selene::push::render(template, &values);
});
