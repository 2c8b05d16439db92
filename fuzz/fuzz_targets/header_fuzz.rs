#![no_main]
use libfuzzer_sys::fuzz_target;
use xzrelay::codec::xz::StreamHeader;
use xzrelay::gate;

fuzz_target!(|data: &[u8]| {
    if let Ok(header) = StreamHeader::parse(data) {
        let _ = header.check.size();
    }

    // Toggling xz on and off must restore any list that did not name it.
    let list = String::from_utf8_lossy(data);
    if !gate::advertises(&list, gate::XZ_TOKEN) {
        let on = gate::reconcile(false, true, &list);
        assert_eq!(gate::reconcile(true, false, &on), list);
    }
});
