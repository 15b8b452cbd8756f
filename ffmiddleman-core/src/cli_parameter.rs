/// A single flag of the tool's command line, rendered as `-name [value]`.
#[derive(Debug, Clone, PartialEq)]
pub enum CLIParameter {
    String { name: &'static str, value: String },
    Number { name: &'static str, value: f64 },
    Bool { name: &'static str },
}

impl CLIParameter {
    pub const PREFIX: &'static str = "-";

    #[inline]
    pub fn new_string(name: &'static str, value: &str) -> CLIParameter {
        CLIParameter::String {
            name,
            value: value.to_owned(),
        }
    }

    /// `None` values produce no parameter at all.
    #[inline]
    pub fn new_optional_string(name: &'static str, value: Option<&str>) -> Option<CLIParameter> {
        value.map(|value| CLIParameter::new_string(name, value))
    }

    #[inline]
    pub fn new_number(name: &'static str, value: f64) -> CLIParameter {
        CLIParameter::Number {
            name,
            value,
        }
    }

    #[inline]
    pub fn new_bool(name: &'static str) -> CLIParameter {
        CLIParameter::Bool {
            name,
        }
    }

    #[inline]
    pub fn name(&self) -> &'static str {
        match self {
            CLIParameter::String {
                name, ..
            }
            | CLIParameter::Number {
                name, ..
            }
            | CLIParameter::Bool {
                name,
            } => name,
        }
    }

    #[inline]
    pub fn to_string_pair(&self) -> (String, Option<String>) {
        let flag = format!("{}{}", Self::PREFIX, self.name());
        match self {
            CLIParameter::String {
                value, ..
            } => (flag, Some(value.clone())),
            CLIParameter::Number {
                value, ..
            } => (flag, Some(value.to_string())),
            CLIParameter::Bool {
                ..
            } => (flag, None),
        }
    }

    #[inline]
    pub fn push_to(&self, arguments: &mut Vec<String>) {
        let (flag, value) = self.to_string_pair();
        arguments.push(flag);
        arguments.extend(value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn whole_numbers_render_without_fraction() {
        assert_eq!(
            CLIParameter::new_number("crf", 20.0).to_string_pair(),
            ("-crf".to_owned(), Some("20".to_owned()))
        );
    }

    #[test]
    fn flags_have_no_value() {
        let mut arguments = Vec::new();
        CLIParameter::new_bool("y").push_to(&mut arguments);
        CLIParameter::new_string("c:v", "libx265").push_to(&mut arguments);

        assert_eq!(arguments, ["-y", "-c:v", "libx265"]);
    }

    #[test]
    fn missing_optional_values_are_dropped() {
        assert_eq!(CLIParameter::new_optional_string("tune", None), None);
    }
}
