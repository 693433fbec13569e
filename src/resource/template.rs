//! Default payloads for creating resources

use serde_json::{json, Value};

pub fn stack() -> Value {
    json!({
        "type": "stack",
        "startOnCreate": true,
        "group": null
    })
}

pub fn service() -> Value {
    json!({
        "scale": 1,
        "scalePolicy": {
            "increment": 1,
            "max": 1,
            "min": 1
        },
        "startOnCreate": true,
        "launchConfig": {
            "accountId": null,
            "privileged": false,
            "image": "alpine:latest",
            "startOnCreate": true,
            "networkMode": "managed",
            "labels": {
                "io.rancher.container.pull_image": "always"
            },
            "logConfig": {
                "config": {},
                "driver": "",
                "type": "logConfig"
            },
            "prePullOnUpgrade": "existing",
            "restartPolicy": {
                "name": "always",
                "type": "restartPolicy"
            },
            "stdinOpen": true,
            "stopSignal": "SIGTERM",
            "stopTimeout": 10,
            "tty": true,
            "type": "launchConfig"
        }
    })
}
