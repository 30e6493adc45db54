//! Prompt templates for the retrieval, answer and summary agents.

use super::qa::AnswerStyle;
use super::summary::AnalysisType;

pub fn retrieval_prompt(
    tools: &str,
    tool_names: &str,
    chat_history: &str,
    question: &str,
    scratchpad: &str,
) -> String {
    format!(
        r#"你是一个专业的法律条文检索专家。根据用户的法律问题，使用工具检索相关的法律条文。

对话历史：
{chat_history}

问题：{question}

你可以使用的工具：
{tool_names}

{tools}

重要提示：你必须严格按照以下格式回答，每行都不能省略：

Thought: 我需要思考如何回答这个问题
Action: 要使用的工具名称
Action Input: 工具的输入参数（必须是有效的JSON格式）
Observation: 工具返回的结果
... (这个 Thought/Action/Action Input/Observation 可以重复N次)
Thought: 我现在知道最终答案了
Final Answer: 最终答案

格式要求：
1. 每个"Thought:"后面必须跟一个"Action:"
2. 每个"Action:"后面必须跟一个"Action Input:"
3. Action Input必须是有效的JSON格式，例如: {{"query": "查询内容", "k": 3, "min_score": 0.4}}
4. 不要使用query="..."这种格式，必须使用JSON格式
5. 如果不需要使用工具，直接写"Final Answer:"
6. 绝对不能省略任何标签

开始！

{scratchpad}"#
    )
}

pub fn answer_prompt(
    style: AnswerStyle,
    chat_history: &str,
    question: &str,
    legal_context: &str,
) -> String {
    let (role, requirements) = match style {
        AnswerStyle::Professional => (
            "你是一位资深的法律顾问，具有深厚的法学功底和丰富的实务经验。请基于提供的法律条文，为用户提供专业、准确、连贯的法律咨询服务。",
            "请提供专业的法律回答，要求：\n\
             - 严格基于提供的法律条文进行分析，明确指出适用的具体法律条款\n\
             - 全面阐述相关的法律规定和可能的法律后果\n\
             - 结合实务经验提供实用的法律建议，并指出需要注意的法律风险\n\
             - 语言专业规范，逻辑清晰，回答连贯完整\n\
             - 如果条文不足以完全回答问题，请明确说明\n\
             - 对于复杂案件建议咨询专业律师，避免提供具体的诉讼指导",
        ),
        AnswerStyle::Simple => (
            "你是一个友善的法律助手，请用通俗易懂的语言回答用户的法律问题。",
            "请用简单明了的语言回答用户的问题：\n\
             - 先用通俗的话解释相关的法律规定，避免使用过多专业术语\n\
             - 语言通俗易懂，贴近生活，重点突出，字数尽量少而精\n\
             - 如果情况比较复杂，建议咨询专业律师",
        ),
        AnswerStyle::Detailed => (
            "你是一位法学教授和实务专家，请提供详细、全面的法律分析。",
            "请提供详细全面的法律分析：\n\
             首先深入分析问题的法律性质和争议焦点，然后逐条解读相关法律条文的含义和适用条件，\
             阐述相关的法理基础和立法目的。进一步结合司法实践进行分析，如果存在争议，应列举不同的法律观点。\
             在此基础上全面评估各种可能的法律风险，最后提供具体的操作指导和注意事项。\n\n\
             要求分析全面深入、逻辑严密，引用具体的法律条文和编号，考虑不同情况和例外情形，提供可操作的建议。",
        ),
    };

    format!(
        "{role}\n\n对话历史：\n{chat_history}\n\n用户问题：\n{question}\n\n相关法律条文：\n{legal_context}\n\n{requirements}\n\n回答："
    )
}

pub fn conversation_summary_prompt(conversation: &str) -> String {
    format!(
        "请对以下法律咨询对话进行总结：\n\n对话内容：\n{conversation}\n\n\
         请从以下方面进行总结：\n\n\
         1. **咨询主题**：用户主要咨询的法律问题\n\
         2. **涉及法律领域**：涉及哪些法律领域和相关法规\n\
         3. **核心问题**：对话中的核心法律问题和争议点\n\
         4. **提供建议**：助手提供的主要法律建议和指导\n\
         5. **后续事项**：需要进一步关注或处理的事项\n\n\
         要求：总结简洁明了，重点突出，保留重要的法律术语和关键信息。\n\n总结："
    )
}

pub fn analysis_prompt(analysis_type: AnalysisType, content: &str) -> String {
    match analysis_type {
        AnalysisType::LegalContent => format!(
            "请对以下法律内容进行分析：\n\n法律内容：\n{content}\n\n\
             请从以下方面进行分析：\n\n\
             1. **内容性质**：分析内容的法律性质和类型\n\
             2. **关键条款**：提取关键的法律条款和规定\n\
             3. **适用范围**：说明适用的对象、情形和条件\n\
             4. **法律后果**：分析违反或适用该内容的法律后果\n\
             5. **实务要点**：指出在实际应用中需要注意的要点\n\
             6. **相关法律**：列出相关的其他法律法规\n\n\
             要求：分析客观准确，逻辑清晰，避免过度解读。\n\n分析："
        ),
        AnalysisType::LawAnalysis => format!(
            "请对以下法律条文进行专业分析：\n\n法律条文：\n{content}\n\n\
             请进行以下分析：\n\n\
             1. **条文解读**：逐条解读条文的含义和要求\n\
             2. **立法目的**：分析条文的立法目的和保护对象\n\
             3. **适用条件**：说明条文的适用条件和例外情况\n\
             4. **操作指引**：提供条文在实践中的操作指引\n\
             5. **注意事项**：指出理解和应用中的注意事项\n\n\
             要求：分析专业准确，通俗易懂。\n\n分析："
        ),
        AnalysisType::SessionInsights => format!(
            "请对以下法律咨询会话进行深度分析，提供洞察：\n\n会话数据：\n{content}\n\n\
             请提供以下洞察：\n\n\
             1. **咨询模式**：分析用户的咨询模式和特点\n\
             2. **问题演进**：分析问题的发展和深入过程\n\
             3. **知识需求**：分析用户的法律知识需求层次\n\
             4. **改进建议**：对未来咨询服务的改进建议\n\n\
             要求：分析深入客观，提供可行的建议。\n\n洞察："
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retrieval_prompt_keeps_literal_braces() {
        let prompt = retrieval_prompt("law_retrieval: 检索", "law_retrieval", "暂无对话历史", "问题", "");
        assert!(prompt.contains(r#"{"query": "查询内容", "k": 3, "min_score": 0.4}"#));
        assert!(prompt.contains("问题：问题"));
    }

    #[test]
    fn test_answer_prompt_varies_by_style() {
        let p = answer_prompt(AnswerStyle::Simple, "h", "q", "ctx");
        assert!(p.contains("通俗易懂"));
        assert!(p.ends_with("回答："));
        let d = answer_prompt(AnswerStyle::Detailed, "h", "q", "ctx");
        assert!(d.contains("法学教授"));
    }
}
