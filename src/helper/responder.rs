//! Canned MATLAB troubleshooting answers
//!
//! A query is checked against a fixed, ordered list of patterns; the first
//! match picks the template and its confidence. Unmatched queries get the
//! general checklist.

use lazy_static::lazy_static;
use regex::Regex;

use super::protocol::TroubleshootResponse;

/// Source reference attached to every answer
pub const DEFAULT_SOURCE: &str = "MATLAB Documentation";

/// Marker the host puts in the context of an improvement request
pub const IMPROVEMENT_MARKER: &str = "previous answer was not helpful";

lazy_static! {
    static ref INDEX_ERROR: Regex =
        Regex::new(r"(?i)(index|indices).*(out of bounds|exceed.*dimensions)").expect("valid regex");
    static ref UNDEFINED_FUNCTION: Regex =
        Regex::new(r"(?i)undefined\s+(function|variable)").expect("valid regex");
    static ref DIMENSION_MISMATCH: Regex =
        Regex::new(r"(?i)(matrix dimensions|dimensions.*agree|size.*match)").expect("valid regex");
    static ref CONCATENATION: Regex =
        Regex::new(r"(?i)(concatenation|cat|horzcat|vertcat).*dimension").expect("valid regex");
    static ref USER_FEEDBACK: Regex =
        Regex::new(r#"User feedback:\s*"([^"]*)""#).expect("valid regex");
}

/// Which canned answer a query resolved to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Template {
    Improved,
    IndexError,
    UndefinedFunction,
    DimensionMismatch,
    Concatenation,
    General,
}

impl Template {
    pub fn score(&self) -> f64 {
        match self {
            Template::Improved => 0.9,
            Template::IndexError => 0.95,
            Template::UndefinedFunction => 0.9,
            Template::DimensionMismatch => 0.85,
            Template::Concatenation => 0.8,
            Template::General => 0.6,
        }
    }

    pub fn explanation(&self) -> &'static str {
        match self {
            Template::Improved => "Improved based on feedback",
            Template::IndexError => "High confidence index error match",
            Template::UndefinedFunction => "High confidence undefined function match",
            Template::DimensionMismatch => "Medium-high confidence dimension mismatch",
            Template::Concatenation => "Medium confidence concatenation error match",
            Template::General => "General response for unmatched query pattern",
        }
    }

    /// Metric label
    pub fn label(&self) -> &'static str {
        match self {
            Template::Improved => "improved",
            Template::IndexError => "index_error",
            Template::UndefinedFunction => "undefined_function",
            Template::DimensionMismatch => "dimension_mismatch",
            Template::Concatenation => "concatenation",
            Template::General => "general",
        }
    }
}

/// A resolved answer before it is put on the wire
#[derive(Debug, Clone, PartialEq)]
pub struct Answer {
    pub template: Template,
    pub text: String,
}

impl Answer {
    pub fn into_response(self) -> TroubleshootResponse {
        TroubleshootResponse {
            answer: self.text,
            score: self.template.score(),
            explanation: self.template.explanation().to_string(),
            sources: vec![DEFAULT_SOURCE.to_string()],
        }
    }
}

/// Pick the template for a bare query (context ignored)
pub fn classify(query: &str) -> Template {
    if INDEX_ERROR.is_match(query) {
        Template::IndexError
    } else if UNDEFINED_FUNCTION.is_match(query) {
        Template::UndefinedFunction
    } else if DIMENSION_MISMATCH.is_match(query) {
        Template::DimensionMismatch
    } else if CONCATENATION.is_match(query) {
        Template::Concatenation
    } else {
        Template::General
    }
}

/// Answer a query, honouring an improvement request carried in `context`
pub fn respond(query: &str, context: &str) -> Answer {
    if !context.is_empty() && context.contains(IMPROVEMENT_MARKER) {
        return Answer {
            template: Template::Improved,
            text: improved_answer(query, context),
        };
    }

    let template = classify(query);
    Answer {
        template,
        text: template_text(template, query),
    }
}

fn template_text(template: Template, query: &str) -> String {
    match template {
        Template::IndexError => INDEX_ERROR_TEXT.to_string(),
        Template::UndefinedFunction => UNDEFINED_FUNCTION_TEXT.to_string(),
        Template::DimensionMismatch => DIMENSION_MISMATCH_TEXT.to_string(),
        Template::Concatenation => CONCATENATION_TEXT.to_string(),
        Template::General | Template::Improved => general_text(query),
    }
}

fn improved_answer(query: &str, context: &str) -> String {
    let feedback = USER_FEEDBACK
        .captures(context)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim())
        .filter(|f| !f.is_empty());

    let mut text = String::from("### Improved Answer\n\n");
    match feedback {
        Some(feedback) => text.push_str(&format!(
            "You said the previous answer was not helpful: \"{}\". Here is a more focused walkthrough.\n\n",
            feedback
        )),
        None => text.push_str("Here is a more focused walkthrough.\n\n"),
    }
    text.push_str(
        "#### Narrow it down first:\n\
         1. Run the failing line on its own and copy the **exact** error message\n\
         2. Use `dbstop if error` so MATLAB pauses where the error is raised\n\
         3. Inspect the variables involved with `whos` and `size`\n\n",
    );
    text.push_str(&template_text(classify(query), query));
    text
}

fn general_text(query: &str) -> String {
    let shown: String = query.chars().take(50).collect();
    let ellipsis = if query.chars().count() > 50 { "..." } else { "" };
    format!(
        "### MATLAB Troubleshooting\n\n\
         I couldn't identify a specific MATLAB error pattern in your query: \"{}{}\"\n\n{}",
        shown, ellipsis, GENERAL_TIPS_TEXT
    )
}

const INDEX_ERROR_TEXT: &str = r#"### Index Out of Bounds Error

This is one of the most common MATLAB errors. It occurs when you try to access an element of an array using an index that exceeds the array's dimensions.

#### Common causes:
- Using a constant index that's too large: `A(10)` when `A` only has 5 elements
- Using a variable index that becomes too large during iteration
- Off-by-one errors (forgetting that MATLAB indexing starts at 1, not 0)

#### Solutions:
1. **Check your array dimensions** with `size()` or `length()`
2. **Use conditional indexing** to avoid out-of-bounds access:
```matlab
if idx <= length(myArray)
    value = myArray(idx);
end
```
3. **Use the `end` keyword** to refer to the last element:
```matlab
lastElement = myArray(end);
secondLastElement = myArray(end-1);
```

#### Best practices:
- Always validate indices before using them
- Consider using logical indexing instead of numeric indexing where appropriate
- Use the `min()` function to cap your indices: `index = min(index, length(array))`"#;

const UNDEFINED_FUNCTION_TEXT: &str = r#"### Undefined Function or Variable Error

This error occurs when MATLAB cannot find a function or variable you're trying to use.

#### Common causes:
1. **Typos** in function or variable names
2. **Missing or inaccessible files** that contain the function definition
3. **Path issues** where MATLAB can't find your function files
4. **Scope issues** where variables aren't defined in the current workspace

#### Solutions:
1. **Check spelling and capitalization**
   - MATLAB is case-sensitive: `myFunction` and `myfunction` are different
2. **Verify function location and MATLAB path**
   - Use `which functionName` to see if MATLAB can find the function
   - Use `path` to see the current MATLAB search path
   - Add directories to the path: `addpath('/path/to/your/functions')`
3. **For missing variables**
   - Use `whos` to list all variables in the current workspace
   - Check if the variable was created in another workspace or cleared
4. **For built-in functions**
   - Make sure you haven't accidentally created a variable with the same name as a MATLAB function
   - Check for conflicting function names from different toolboxes

#### Function vs. Script distinction:
If you're trying to call a script as if it were a function, it won't work. Scripts don't accept input arguments or return output arguments the way functions do."#;

const DIMENSION_MISMATCH_TEXT: &str = r#"### Matrix Dimensions Must Agree Error

This error occurs when you try to perform operations on matrices with incompatible dimensions.

#### Common operations that require dimension checking:
1. **Matrix addition/subtraction**: Matrices must have exactly the same dimensions
2. **Matrix multiplication**: For A×B, number of columns in A must equal number of rows in B
3. **Element-wise operations**: Arrays must have compatible dimensions for broadcasting

#### Diagnosing the problem:
```matlab
% Check sizes of your matrices
size(A)
size(B)
```

#### Solutions:
1. **Transpose one of your matrices** if appropriate:
```matlab
% Change A*B to A*B' or A'*B
result = A*B';
```
2. **Reshape your matrices**:
```matlab
A = reshape(A, [rows, cols]);
```
3. **For element-wise operations, use broadcasting rules**:
```matlab
A + repmat(B, size(A,1), 1);
```

#### Common scenarios:
- Trying to add a row vector to a column vector
- Matrix multiplication with incompatible dimensions
- Using concatenation functions with mismatched dimensions"#;

const CONCATENATION_TEXT: &str = r#"### Concatenation Dimension Mismatch Error

This error occurs when trying to concatenate arrays that have incompatible dimensions.

#### Understanding MATLAB concatenation:
1. **Horizontal concatenation** (`horzcat` or `[A, B]`): Arrays must have the same number of rows
2. **Vertical concatenation** (`vertcat` or `[A; B]`): Arrays must have the same number of columns

#### Diagnosing the problem:
```matlab
% Check sizes of arrays you're trying to concatenate
size(A)
size(B)
```

#### Common solutions:
1. **Reshape one or more arrays** to match dimensions:
```matlab
B = reshape(B, size(A,1), []);
result = [A, B];
```
2. **Transpose if appropriate**:
```matlab
result = [A, B'];
```
3. **Pad with zeros or NaN** to match dimensions:
```matlab
B_padded = [B; zeros(1, size(B,2))];
result = [A; B_padded];
```

#### Best practices:
- Always check dimensions before concatenation
- Use `cat()` with an explicit dimension parameter for clarity
- When working with cell arrays, remember each cell can have different dimensions"#;

const GENERAL_TIPS_TEXT: &str = r#"Here are some general troubleshooting tips:

#### Basic debugging steps:
1. **Check variable types and dimensions**:
```matlab
whos variableName
size(variableName)
class(variableName)
```
2. **Add breakpoints or use debug mode** to step through your code
3. **Simplify your problem**:
   - Comment out sections of code to isolate the issue
   - Try with simplified inputs
   - Break complex operations into smaller steps
4. **Common MATLAB error patterns**:
   - Index out of bounds: Access to array elements that don't exist
   - Undefined function or variable: Typos or missing files
   - Matrix dimensions: Operations on incompatible matrices
   - File I/O errors: File permissions or incorrect paths
   - Memory issues: Arrays too large for available memory

If you could provide more details about your specific error message or code snippet, I can give you more targeted help."#;
