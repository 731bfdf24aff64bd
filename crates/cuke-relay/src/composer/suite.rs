use crate::tags::TestOptions;

/// A describe-block: a feature or a rule.
#[derive(Debug, Clone, PartialEq)]
pub struct Suite {
    pub title: String,
    /// Suite-only options taken from the feature's or rule's tags.
    pub options: TestOptions,
    pub children: Vec<SuiteChild>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SuiteChild {
    Suite(Suite),
    Test(Test),
}

/// One test, backed by one pickle.
#[derive(Debug, Clone, PartialEq)]
pub struct Test {
    pub title: String,
    pub pickle_id: String,
    pub options: TestOptions,
    /// Filtered out but still declared, so the runner reports it as pending.
    pub pending: bool,
}

impl Suite {
    pub fn new(title: impl Into<String>, options: TestOptions) -> Self {
        Self {
            title: title.into(),
            options,
            children: Vec::new(),
        }
    }

    /// Every test in declaration order, depth first.
    pub fn tests(&self) -> Vec<&Test> {
        let mut tests = Vec::new();
        self.collect_tests(&mut tests);
        tests
    }

    fn collect_tests<'a>(&'a self, tests: &mut Vec<&'a Test>) {
        for child in &self.children {
            match child {
                SuiteChild::Suite(suite) => suite.collect_tests(tests),
                SuiteChild::Test(test) => tests.push(test),
            }
        }
    }

    pub fn titles(&self) -> Vec<&str> {
        self.tests().iter().map(|test| test.title.as_str()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test(title: &str) -> SuiteChild {
        SuiteChild::Test(Test {
            title: title.to_string(),
            pickle_id: format!("pickle-{title}"),
            options: TestOptions::new(),
            pending: false,
        })
    }

    #[test]
    fn test_tests_are_depth_first() {
        let mut rule = Suite::new("rule", TestOptions::new());
        rule.children.push(test("b"));
        let mut feature = Suite::new("feature", TestOptions::new());
        feature.children.push(test("a"));
        feature.children.push(SuiteChild::Suite(rule));
        feature.children.push(test("c"));

        assert_eq!(feature.titles(), vec!["a", "b", "c"]);
    }
}
