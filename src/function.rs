// Metric-name suffix grammar: `<name>[._<post>][._<read>]`, either order.

use std::fmt;
use std::str::FromStr;
use thiserror::Error;

const SUFFIX_SEPARATOR: &str = "._";
const MAX_SUFFIX_PARTS: usize = 2;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FunctionFormatError {
    #[error("metric name {name:?} has {count} suffix parts, at most {MAX_SUFFIX_PARTS} allowed")]
    TooManyParts { name: String, count: usize },
    #[error("unknown function {segment:?} in metric name {name:?}")]
    UnknownFunction { name: String, segment: String },
    #[error("function {segment:?} given more than once in metric name {name:?}")]
    Duplicate { name: String, segment: String },
}

/// How stored samples are read back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub enum ReadFunction {
    #[default]
    Value,
    Avg,
    Min,
    Max,
    Sum,
}

impl ReadFunction {
    pub fn suffix(&self) -> &'static str {
        match self {
            ReadFunction::Value => "",
            ReadFunction::Avg => "._avg",
            ReadFunction::Min => "._min",
            ReadFunction::Max => "._max",
            ReadFunction::Sum => "._sum",
        }
    }
}

impl FromStr for ReadFunction {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "value" => Ok(ReadFunction::Value),
            "avg" => Ok(ReadFunction::Avg),
            "min" => Ok(ReadFunction::Min),
            "max" => Ok(ReadFunction::Max),
            "sum" => Ok(ReadFunction::Sum),
            _ => Err(()),
        }
    }
}

/// Transformation applied after reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub enum PostProcessingFunction {
    #[default]
    None,
    Rate,
}

impl PostProcessingFunction {
    pub fn suffix(&self) -> &'static str {
        match self {
            PostProcessingFunction::None => "",
            PostProcessingFunction::Rate => "._rate",
        }
    }
}

impl FromStr for PostProcessingFunction {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "none" => Ok(PostProcessingFunction::None),
            "rate" => Ok(PostProcessingFunction::Rate),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub struct Function {
    pub read_function: ReadFunction,
    pub post_processing: PostProcessingFunction,
}

impl Function {
    pub fn new(read_function: ReadFunction, post_processing: PostProcessingFunction) -> Self {
        Self {
            read_function,
            post_processing,
        }
    }

    /// Split `name` into the bare metric name and its function pair.
    pub fn from_metric_name(name: &str) -> Result<(String, Function), FunctionFormatError> {
        let mut parts = name.split(SUFFIX_SEPARATOR);
        let base = parts.next().unwrap_or_default().to_string();
        let suffixes: Vec<&str> = parts.collect();
        if suffixes.len() > MAX_SUFFIX_PARTS {
            return Err(FunctionFormatError::TooManyParts {
                name: name.to_string(),
                count: suffixes.len(),
            });
        }

        let mut read: Option<ReadFunction> = None;
        let mut post: Option<PostProcessingFunction> = None;
        for segment in suffixes {
            let duplicate = || FunctionFormatError::Duplicate {
                name: name.to_string(),
                segment: segment.to_string(),
            };
            if let Ok(f) = segment.parse::<ReadFunction>() {
                if read.replace(f).is_some() {
                    return Err(duplicate());
                }
            } else if let Ok(f) = segment.parse::<PostProcessingFunction>() {
                if post.replace(f).is_some() {
                    return Err(duplicate());
                }
            } else {
                return Err(FunctionFormatError::UnknownFunction {
                    name: name.to_string(),
                    segment: segment.to_string(),
                });
            }
        }

        Ok((
            base,
            Function::new(read.unwrap_or_default(), post.unwrap_or_default()),
        ))
    }

    /// Display suffix: post-processing first, then read function.
    pub fn suffix(&self) -> String {
        format!(
            "{}{}",
            self.post_processing.suffix(),
            self.read_function.suffix()
        )
    }
}

impl fmt::Display for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.suffix())
    }
}
