use crate::segmentation::QualityLevel;

pub const QUALITY_PARAM: &str = "Quality";
pub const RESET_PARAM: &str = "Reset";

/// One selectable entry of a menu parameter
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MenuOption {
    pub name: &'static str,
    pub label: &'static str,
}

/// A control the host should show in its parameter panel
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParameterDecl {
    Menu {
        name: &'static str,
        label: &'static str,
        options: Vec<MenuOption>,
        default: &'static str,
    },
    /// Momentary button
    Pulse {
        name: &'static str,
        label: &'static str,
    },
}

impl ParameterDecl {
    pub fn name(&self) -> &'static str {
        match self {
            ParameterDecl::Menu { name, .. } | ParameterDecl::Pulse { name, .. } => name,
        }
    }
}

/// Host-originated control input
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlEvent {
    MenuChanged { name: String, value: String },
    PulsePressed { name: String },
    PulseReleased { name: String },
}

impl ControlEvent {
    pub fn quality(level: QualityLevel) -> Self {
        ControlEvent::MenuChanged {
            name: QUALITY_PARAM.to_string(),
            value: level.name().to_string(),
        }
    }

    pub fn reset() -> Self {
        ControlEvent::PulsePressed {
            name: RESET_PARAM.to_string(),
        }
    }
}

/// What the pipeline has to do in response to an event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlAction {
    None,
    Reset,
}

/// Holds the host-settable state: the quality selector
#[derive(Debug, Clone)]
pub struct ControlSurface {
    quality: QualityLevel,
    default_quality: QualityLevel,
}

impl ControlSurface {
    pub fn new(default_quality: QualityLevel) -> Self {
        Self {
            quality: default_quality,
            default_quality,
        }
    }

    pub fn quality(&self) -> QualityLevel {
        self.quality
    }

    pub fn declare(&self) -> Vec<ParameterDecl> {
        vec![
            ParameterDecl::Menu {
                name: QUALITY_PARAM,
                label: "Quality",
                options: QualityLevel::ALL
                    .into_iter()
                    .map(|level| MenuOption {
                        name: level.name(),
                        label: level.label(),
                    })
                    .collect(),
                default: self.default_quality.name(),
            },
            ParameterDecl::Pulse {
                name: RESET_PARAM,
                label: "Reset",
            },
        ]
    }

    /// Apply an event to the surface and report the follow-up action
    ///
    /// Reset fires on press only; releases and unknown controls are ignored.
    pub fn route(&mut self, event: &ControlEvent) -> ControlAction {
        match event {
            ControlEvent::MenuChanged { name, value } if is(name, QUALITY_PARAM) => {
                match value.parse::<QualityLevel>() {
                    Ok(level) => {
                        if level != self.quality {
                            tracing::debug!("Quality set to {}", level);
                        }
                        self.quality = level;
                    }
                    Err(e) => tracing::warn!("Ignoring quality change: {}", e),
                }
                ControlAction::None
            }
            ControlEvent::PulsePressed { name } if is(name, RESET_PARAM) => ControlAction::Reset,
            ControlEvent::PulseReleased { name } if is(name, RESET_PARAM) => ControlAction::None,
            other => {
                tracing::warn!("Ignoring event for unknown control: {:?}", other);
                ControlAction::None
            }
        }
    }
}

impl Default for ControlSurface {
    fn default() -> Self {
        Self::new(QualityLevel::default())
    }
}

fn is(name: &str, param: &str) -> bool {
    name.eq_ignore_ascii_case(param)
}
