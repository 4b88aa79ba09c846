//! Declared output schemas and prompts for the extraction oracle.
//!
//! Each call site declares its own JSON schema; category and account enums
//! are injected from the live catalog at call time, so the model can only
//! answer with names the spreadsheet currently knows.

use serde_json::{json, Value};

use crate::catalog::CatalogSnapshot;

use super::OperationKind;

const AMOUNT_HINT: &str = "Сумма должна быть положительная. Если пользователь говорит \
выполнить математическую операцию, нужно сложить, вычесть, умножить или разделить суммы \
в зависимости от его запроса.";

fn json_schema(schema: Value) -> Value {
    json!({
        "type": "json_schema",
        "json_schema": {
            "name": "ledger_extraction",
            "strict": true,
            "schema": schema
        }
    })
}

fn enum_string(values: &[String]) -> Value {
    json!({
        "type": "string",
        "items": { "type": "string", "enum": values }
    })
}

fn status_property() -> Value {
    json!({
        "type": "string",
        "items": { "type": "string", "enum": ["Committed", "Planned"] }
    })
}

/// Response format for the multi-intent split.
pub fn intent_split_format(catalog: &CatalogSnapshot) -> Value {
    let labels: Vec<&str> = [
        OperationKind::Expense,
        OperationKind::Income,
        OperationKind::Transfer,
        OperationKind::Adjustment,
    ]
    .iter()
    .map(OperationKind::oracle_label)
    .collect();

    json_schema(json!({
        "type": "object",
        "properties": {
            "operations": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {
                        "user_request_is_relevant": { "type": "boolean" },
                        "operation_type": {
                            "type": "string",
                            "description": format!(
                                "Тип денежной операции. Иначе, None.\n\
                                 Дополнительная информация:\n\
                                 Категории расходов: {:?}\n\
                                 Категории доходов: {:?}\n\
                                 Счета: {:?}\n\
                                 Если сомневаешься между Расходы и Доходы - выбирай Расходы.",
                                catalog.expense_categories,
                                catalog.income_categories,
                                catalog.accounts
                            ),
                            "items": {
                                "type": "string",
                                "enum": std::iter::once("None").chain(labels).collect::<Vec<_>>()
                            }
                        },
                        "source_inputted_text": { "type": "string" },
                        "message_to_user": { "type": "string" }
                    },
                    "required": [
                        "user_request_is_relevant",
                        "operation_type",
                        "source_inputted_text",
                        "message_to_user"
                    ],
                    "additionalProperties": false
                }
            }
        },
        "required": ["operations"],
        "description": "Важно: внутри одного сообщения от пользователя могут быть несколько \
                        операций. Но! Разделить сообщение на несколько можно только в случае, \
                        если пользователь явно указывает на разные операции, например, используя \
                        'во-первых', 'во-вторых' и т.д.",
        "additionalProperties": false
    }))
}

/// Messages for the multi-intent split.
pub fn intent_split_messages(transcript: &str) -> Value {
    json!([
        { "role": "user", "content": transcript },
        {
            "role": "system",
            "content": "Ты - связующее звено между пользователем и семейной таблицей бюджета. \
                        Твоя задача - точно и уверенно определить:\n\
                        1) Относится ли сообщение пользователя к темам: доходы, расходы, бюджет, \
                        финансы. Пользователь мог записать сообщение в шутку, оно может быть \
                        пустым или содержать неразборчивую речь - всё это нерелевантный запрос.\n\
                        2) Тип операции. Смотри на сообщение пользователя и категории доходов, \
                        расходов и счета - они подскажут тип операции."
        }
    ])
}

/// Response format for one intent's field extraction.
pub fn fields_format(kind: OperationKind, catalog: &CatalogSnapshot) -> Value {
    let schema = match kind {
        OperationKind::Expense => json!({
            "type": "object",
            "properties": {
                "expenses_category": enum_string(&catalog.expense_categories),
                "account": enum_string(&catalog.accounts),
                "amount": {
                    "type": "number",
                    "description": format!("Сумма, которую потратил пользователь. {AMOUNT_HINT}")
                },
                "status": status_property(),
                "comment": { "type": "string" },
                "final_answer": { "type": "string" }
            },
            "required": [
                "expenses_category", "account", "amount", "status", "comment", "final_answer"
            ],
            "additionalProperties": false
        }),
        OperationKind::Income => json!({
            "type": "object",
            "properties": {
                "incomes_category": enum_string(&catalog.income_categories),
                "account": enum_string(&catalog.accounts),
                "amount": { "type": "number" },
                "status": status_property(),
                "comment": { "type": "string" },
                "final_answer": { "type": "string" }
            },
            "required": [
                "incomes_category", "account", "amount", "status", "comment", "final_answer"
            ],
            "additionalProperties": false
        }),
        OperationKind::Transfer => json!({
            "type": "object",
            "properties": {
                "write_off_account": enum_string(&catalog.accounts),
                "replenishment_account": enum_string(&catalog.accounts),
                "write_off_amount": {
                    "type": "number",
                    "description": format!("Сумма списания со счета. {AMOUNT_HINT}")
                },
                "replenishment_amount": {
                    "type": "number",
                    "description": format!("Сумма пополнения счета. {AMOUNT_HINT}")
                },
                "status": status_property(),
                "comment": { "type": "string" },
                "final_answer": { "type": "string" }
            },
            "required": [
                "write_off_account", "replenishment_account", "write_off_amount",
                "replenishment_amount", "status", "comment", "final_answer"
            ],
            "additionalProperties": false
        }),
        OperationKind::Adjustment => json!({
            "type": "object",
            "properties": {
                "adjustment_account": enum_string(&catalog.accounts),
                "adjustment_amount": {
                    "type": "number",
                    "description": format!("Сумма корректировки счета. {AMOUNT_HINT}")
                },
                "status": status_property(),
                "comment": { "type": "string" },
                "final_answer": { "type": "string" }
            },
            "required": [
                "adjustment_account", "adjustment_amount", "status", "comment", "final_answer"
            ],
            "additionalProperties": false
        }),
    };
    json_schema(schema)
}

/// Messages for one intent's field extraction.
pub fn fields_messages(span: &str) -> Value {
    json!([
        { "role": "user", "content": span },
        {
            "role": "system",
            "content": "Твоя задача точно и уверенно написать json ответ на основе \
                        преобразованного в текст голосового сообщения от пользователя."
        }
    ])
}

/// Messages for free-text edit interpretation. The response format is a
/// plain JSON object rather than a strict schema: the set of changed
/// fields is open-ended by design.
pub fn edit_messages(row_description: &str, chain_tail: &[String], instruction: &str) -> Value {
    let context = if chain_tail.is_empty() {
        String::new()
    } else {
        format!("История изменений:\n{}\n\n", chain_tail.join("\n"))
    };
    let prompt = format!(
        "Пользователь хочет изменить финансовую операцию.\n\n\
         Текущие данные операции:\n{row_description}\n\n\
         {context}Последний запрос пользователя: {instruction}\n\n\
         Определи, что именно нужно изменить: сумму (amount), категорию (category), \
         счёт (account), комментарий (comment), статус (status), сумму зачисления \
         (replenishment_amount), счёт зачисления (replenishment_account) - или удалить \
         операцию целиком.\n\n\
         ВАЖНО: возвращай ТОЛЬКО те поля, которые нужно изменить. Не включай поля, \
         которые должны остаться без изменений.\n\n\
         Верни JSON вида {{\"action\": \"edit\", \"changes\": {{\"amount\": 500}}}} \
         или {{\"action\": \"delete\"}}."
    );
    json!([
        {
            "role": "system",
            "content": "Ты должен ответить только в формате JSON, строго по схеме. Не добавляй \
                        никакого текста вне JSON. Если не хватает данных - используй значения \
                        по умолчанию, указанные в схеме."
        },
        { "role": "user", "content": prompt }
    ])
}

/// Response format for edit interpretation.
pub fn edit_format() -> Value {
    json!({ "type": "json_object" })
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;

    fn catalog() -> CatalogSnapshot {
        CatalogSnapshot {
            expense_categories: vec!["Продукты".to_owned(), "Кафе".to_owned()],
            income_categories: vec!["Зарплата".to_owned()],
            accounts: vec!["Наличные".to_owned(), "Карта".to_owned()],
        }
    }

    #[test]
    fn intent_split_enumerates_none_and_all_kinds() {
        let format = intent_split_format(&catalog());
        let enum_values = &format["json_schema"]["schema"]["properties"]["operations"]["items"]
            ["properties"]["operation_type"]["items"]["enum"];
        let labels: Vec<&str> = enum_values
            .as_array()
            .unwrap()
            .iter()
            .map(|v| v.as_str().unwrap())
            .collect();
        assert_eq!(
            labels,
            vec!["None", "Расходы", "Доходы", "Переводы", "Корректировка"]
        );
    }

    #[test]
    fn expense_schema_constrains_category_to_catalog() {
        let format = fields_format(OperationKind::Expense, &catalog());
        let enum_values = &format["json_schema"]["schema"]["properties"]["expenses_category"]
            ["items"]["enum"];
        assert_eq!(enum_values.as_array().unwrap().len(), 2);
        assert_eq!(enum_values[0], "Продукты");
    }

    #[test]
    fn adjustment_schema_has_single_account() {
        let format = fields_format(OperationKind::Adjustment, &catalog());
        let properties = format["json_schema"]["schema"]["properties"]
            .as_object()
            .unwrap();
        assert!(properties.contains_key("adjustment_account"));
        assert!(!properties.contains_key("replenishment_account"));
    }

    #[test]
    fn edit_prompt_carries_row_and_context() {
        let messages = edit_messages(
            "Тип: Расходы\nДанные: [45000, Продукты, 500]",
            &["bot: ✅ Расход добавлен".to_owned()],
            "замени 500 на 600",
        );
        let user_prompt = messages[1]["content"].as_str().unwrap();
        assert!(user_prompt.contains("Продукты"));
        assert!(user_prompt.contains("История изменений"));
        assert!(user_prompt.contains("замени 500 на 600"));
    }
}
