use nani_types::TargetLanguage;

use crate::TranslateError;

/// Instruct the model to translate `text` and print nothing but the result
pub fn build_prompt(text: &str, target: TargetLanguage) -> String {
    format!(
        "次のテキストを{}に翻訳してください。翻訳結果のみを出力してください。\n\n{}",
        target.display_name(),
        text
    )
}

pub fn build_prompt_for_code(text: &str, code: &str) -> Result<String, TranslateError> {
    let target: TargetLanguage = code
        .parse()
        .map_err(|e: nani_types::ParseLanguageError| TranslateError::InvalidArgument(e.to_string()))?;

    Ok(build_prompt(text, target))
}
