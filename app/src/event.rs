use serde_json::Value;

/// Event reported by the board.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Event {
    Button { pressed: bool, count: i32 },
    Gain(i32),
    SetSecondary(i32),
    Bridge(i32),
    Record(i32),
    Offset(i32),
    Mode(i32),
}

/// Receives board events on the events worker.
pub type EventHandler = Box<dyn FnMut(Event) + Send>;

fn int(value: &Value, key: &str) -> Option<i32> {
    value.get(key)?.as_i64()?.try_into().ok()
}

impl Event {
    /// Extracts the events from a response of the board, unknown keys are ignored.
    pub fn parse_all(value: &Value) -> Vec<Self> {
        let mut events = Vec::new();
        if let (Some(pressed), Some(count)) = (
            value.get("Button").and_then(Value::as_bool),
            int(value, "ButtonStateCnt"),
        ) {
            events.push(Self::Button { pressed, count });
        }
        let simple: [(&str, fn(i32) -> Self); 6] = [
            ("Gain", Self::Gain),
            ("SetSecondary", Self::SetSecondary),
            ("Bridge", Self::Bridge),
            ("Record", Self::Record),
            ("Offset", Self::Offset),
            ("Mode", Self::Mode),
        ];
        for (key, make) in simple {
            if let Some(x) = int(value, key) {
                events.push(make(x));
            }
        }
        events
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parse() {
        let events = Event::parse_all(&json!({
            "Button": true,
            "ButtonStateCnt": 3,
            "Mode": 1,
            "Gain": 4,
            "Unknown": 0,
        }));
        assert_eq!(
            events,
            [
                Event::Button {
                    pressed: true,
                    count: 3
                },
                Event::Gain(4),
                Event::Mode(1)
            ]
        );
    }

    #[test]
    fn incomplete() {
        assert!(Event::parse_all(&json!({"Button": false})).is_empty());
        assert!(Event::parse_all(&json!(null)).is_empty());
        assert!(Event::parse_all(&json!({"Gain": "high"})).is_empty());
    }
}
