use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Operation requested by the build driver for one invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Recipe {
    /// Compile a C++ source (`cpp.o`)
    CppObject,
    /// Compile a C source (`c.o`)
    CObject,
    /// Assemble a source (`S.o`)
    AsmObject,
    /// Add an object to the core archive (`ar`)
    Archive,
    /// Link the final image (`ld`)
    Link,
    /// Set the stage stamped onto subsequent steps
    Stage,
    /// Print the pass-through flags
    Echo,
    /// Create the empty project C file next to the sketch
    GenProjectC,
    /// Run make against the generated Makefile
    Make,
    /// Preprocess to discover includes
    PreprocIncludes,
    /// Preprocess to discover macros
    PreprocMacros,
    /// Assemble all recorded steps into a Makefile
    Makefile,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Unknown recipe: {0}")]
pub struct UnknownRecipe(pub String);

impl Recipe {
    pub const ALL: [Recipe; 12] = [
        Recipe::CppObject,
        Recipe::CObject,
        Recipe::AsmObject,
        Recipe::Archive,
        Recipe::Link,
        Recipe::Stage,
        Recipe::Echo,
        Recipe::GenProjectC,
        Recipe::Make,
        Recipe::PreprocIncludes,
        Recipe::PreprocMacros,
        Recipe::Makefile,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Recipe::CppObject => "cpp.o",
            Recipe::CObject => "c.o",
            Recipe::AsmObject => "S.o",
            Recipe::Archive => "ar",
            Recipe::Link => "ld",
            Recipe::Stage => "stage",
            Recipe::Echo => "echo",
            Recipe::GenProjectC => "genprjc",
            Recipe::Make => "make",
            Recipe::PreprocIncludes => "preproc.includes",
            Recipe::PreprocMacros => "preproc.macros",
            Recipe::Makefile => "makefile",
        }
    }

    /// Whether this recipe is persisted as a step record
    pub fn is_step(&self) -> bool {
        matches!(
            self,
            Recipe::CppObject | Recipe::CObject | Recipe::AsmObject | Recipe::Archive | Recipe::Link
        )
    }

    /// Whether this recipe produces an object file
    pub fn is_object(&self) -> bool {
        self.as_str().ends_with(".o")
    }

    pub fn is_preproc(&self) -> bool {
        matches!(self, Recipe::PreprocIncludes | Recipe::PreprocMacros)
    }
}

impl FromStr for Recipe {
    type Err = UnknownRecipe;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Recipe::ALL
            .iter()
            .copied()
            .find(|r| r.as_str() == s)
            .ok_or_else(|| UnknownRecipe(s.to_string()))
    }
}

impl fmt::Display for Recipe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
