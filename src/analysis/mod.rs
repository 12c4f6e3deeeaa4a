mod openai;

use axum::async_trait;

pub use openai::OpenAiClient;

/// Dietitian instruction sent with every photo.
const BASE_INSTRUCTION: &str = "你是一位專業營養師，請根據這張圖片回覆下列項目：\n\n\
1. 食物項目\n\
2. 每項估計熱量（卡路里）\n\
3. 總熱量\n\
4. 餐點健康程度分析\n\
5. 飲食建議（如增加蔬菜、降低油脂）\n\n\
最後請以一行營養摘要作結，格式為：\
熱量：X大卡，碳水化合物：X公克，蛋白質：X公克，脂肪：X公克\n\
請用繁體中文回答。";

/// Vision/text-generation service that describes a meal photo.
#[async_trait]
pub trait AnalysisClient: Send + Sync {
    /// Free-form analysis of the image at `image_url`. Must fail rather than return placeholder text.
    async fn analyze(&self, image_url: &str, instruction: &str) -> anyhow::Result<String>;
}

/// Instruction for one request, with the user's note appended when present.
pub fn build_instruction(note: Option<&str>) -> String {
    match note.map(str::trim).filter(|n| !n.is_empty()) {
        Some(n) => format!("{BASE_INSTRUCTION}\n\n使用者補充說明：{n}"),
        None => BASE_INSTRUCTION.to_string(),
    }
}
