#![cfg(target_os = "macos")]

use nobjc::{Bridge, HostValue, RuntimeConfig};

const FOUNDATION: &str = "/System/Library/Frameworks/Foundation.framework/Foundation";

fn bridge() -> Bridge {
    let bridge = Bridge::objc(&RuntimeConfig::default()).unwrap();
    bridge.load_library(FOUNDATION).unwrap();
    bridge
}

#[test]
fn test_nsstring_round_trip() {
    let bridge = bridge();
    let class = bridge.class_object("NSString").unwrap();
    let s = class
        .dispatch("stringWithUTF8String:", &["Hello, Objective-C!".into()])
        .unwrap();
    let s = s.as_handle().unwrap();
    assert_eq!(s.dispatch("length", &[]).unwrap(), HostValue::Number(19.0));
    assert_eq!(
        s.dispatch("UTF8String", &[]).unwrap(),
        HostValue::from("Hello, Objective-C!")
    );
    assert_eq!(s.description().unwrap(), "Hello, Objective-C!");
    assert!(s.responds_to("length").unwrap());
    assert!(!s.responds_to("notARealSelector").unwrap());
}

#[test]
fn test_nsnumber_values() {
    let bridge = bridge();
    let class = bridge.class_object("NSNumber").unwrap();
    let n = class.dispatch("numberWithInt:", &[(-4.0).into()]).unwrap();
    let n = n.as_handle().unwrap();
    assert_eq!(n.dispatch("intValue", &[]).unwrap(), HostValue::Number(-4.0));
    assert_eq!(n.dispatch("doubleValue", &[]).unwrap(), HostValue::Number(-4.0));
    assert_eq!(n.description().unwrap(), "-4");
}
