use serde::{Deserialize, Serialize};

/// 解析后的 MIDI-JSON 结构
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MidiPayload {
    pub header: MidiHeader,

    #[serde(default)]
    pub tracks: Vec<MidiTrack>,

    /// 总时长（秒）
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MidiHeader {
    /// SMF 格式（0/1/2）
    #[serde(default)]
    pub format: u16,

    pub ticks_per_beat: u16,

    /// 初始速度（BPM）
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tempo: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MidiTrack {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel: Option<u8>,

    #[serde(default)]
    pub events: Vec<MidiEvent>,
}

/// MIDI 事件，除时间和类型外的字段原样保留
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MidiEvent {
    /// 绝对时间（tick）
    pub time: u64,

    #[serde(rename = "type")]
    pub kind: String,

    #[serde(flatten)]
    pub fields: serde_json::Map<String, serde_json::Value>,
}

impl MidiPayload {
    pub fn new(format: u16, ticks_per_beat: u16) -> Self {
        Self {
            header: MidiHeader {
                format,
                ticks_per_beat,
                tempo: None,
            },
            tracks: Vec::new(),
            duration: None,
        }
    }

    pub fn with_track(mut self, track: MidiTrack) -> Self {
        self.tracks.push(track);
        self
    }

    pub fn event_count(&self) -> usize {
        self.tracks.iter().map(|t| t.events.len()).sum()
    }
}

impl MidiEvent {
    pub fn note_on(time: u64, note: u8, velocity: u8) -> Self {
        let mut fields = serde_json::Map::new();
        fields.insert("note".to_string(), note.into());
        fields.insert("velocity".to_string(), velocity.into());
        Self {
            time,
            kind: "noteOn".to_string(),
            fields,
        }
    }
}
