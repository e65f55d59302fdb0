use serde::Serialize;

/// Static documentation for a command variant.
///
/// Read by tooling (catalog listings, `describe`, editors). The engine
/// never looks at it.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandDescriptor {
    /// Stable identifier used in script files
    pub name: &'static str,
    /// Short editor label
    pub display_label: &'static str,
    pub group: &'static str,
    pub description: &'static str,
    pub uses_notes: &'static str,
    pub implementation_notes: &'static str,
    pub properties: &'static [PropertyDescriptor],
}

impl CommandDescriptor {
    pub fn property(&self, key: &str) -> Option<&'static PropertyDescriptor> {
        self.properties.iter().find(|p| p.key == key)
    }
}

/// Documentation and input rules for one configuration property.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PropertyDescriptor {
    pub key: &'static str,
    pub label: &'static str,
    pub input_spec: &'static str,
    pub sample_usage: &'static str,
    pub remarks: &'static str,
    pub optional: bool,
    pub control: UiControl,
    pub helpers: &'static [UiHelper],
    /// Valid choices for selector controls; empty means free text
    pub options: &'static [&'static str],
    pub default: Option<&'static str>,
}

impl PropertyDescriptor {
    /// Free-text property with no documentation beyond its label
    pub const fn text(key: &'static str, label: &'static str) -> Self {
        Self {
            key,
            label,
            input_spec: "",
            sample_usage: "",
            remarks: "",
            optional: false,
            control: UiControl::TextBox,
            helpers: &[UiHelper::VariableHelper],
            options: &[],
            default: None,
        }
    }

    pub fn is_selector(&self) -> bool {
        !self.options.is_empty()
    }
}

/// Recommended editor control. Advisory only.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum UiControl {
    TextBox,
    ComboBox,
    Grid,
    MultiLineTextBox,
    CheckBox,
    RadioButton,
    TextLink,
    Label,
}

/// Extra editor affordance offered next to a property
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum UiHelper {
    VariableHelper,
    FileSelection,
    FolderSelection,
    ElementRecorder,
}
