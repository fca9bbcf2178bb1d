//! Prompt templates for the routing, knowledge and summarizer pipelines.
//!
//! Templates use `{placeholder}` tokens filled in with [`render`]; the
//! label-delimited response formats (`[Selected Route]`, `RELEVANT:`) are
//! load-bearing and parsed defensively by the consuming nodes.

/// Fill `{name}` placeholders in a template
pub fn render(template: &str, substitutions: &[(&str, &str)]) -> String {
    let mut out = template.to_string();
    for (name, value) in substitutions {
        out = out.replace(&format!("{{{}}}", name), value);
    }
    out
}

pub const ROUTER_SYSTEM_PROMPT: &str = "\
You are a smart routing agent that decides the next step in a conversation.

Available Routes:
ANSWER: For system-related queries and basic interactions
- System capabilities and features
- Greetings, thanks, and basic acknowledgments
- Clarifying questions about the conversation

KNOWLEDGE: For information queries (both internal documents and external research)
- Questions about specific documents or code in the system
- Questions about technical topics, history, or general knowledge
- Research questions requiring web lookup
- Factual questions about the world

SUMMARIZE: For document summarization requests
- Requests to summarize long documents
- Requests to create concise versions of text
- Requests to extract key points from content

Note: When the user shares a document or asks to process a file, route to KNOWLEDGE.
When the user specifically asks for summarization, route to SUMMARIZE.
Simple acknowledgments and thanks should go to the ANSWER route.

Recent conversation context:
{context}

Think through these steps:
1. Thought: Analyze the current conversation flow and latest query
2. Analysis: Consider conversation history and current needs
3. Action: Select the most appropriate route based on full context

Format your response as:
[Thought Process]
<your analysis of the conversation>

[Analysis]
<why certain capabilities are needed>

[Selected Route]
ANSWER/KNOWLEDGE/SUMMARIZE

[Confidence]
Score: 0-1

[Reasoning]
One line explanation";

pub const ANSWER_PROMPT: &str = "\
You are the final response generator for a multi-agent system. Deliver a clear,
helpful answer to the user based on the conversation history and the context below.

CONTEXT FROM AGENT PROCESSING:

```markdown
{context}
```

RESPONSE GUIDELINES:
1. For knowledge-based answers: present the information clearly, include relevant
   details from the sources, and ALWAYS include a \"Sources:\" section listing every
   source used (document names for internal sources, titles/URLs for web sources).
2. For document summarization: present the summary in a clear, structured format
   and mention the document being summarized.
3. For direct interactions: be concise, direct and conversational.

Focus on answering the user's actual question from the provided context and
conversation history. Do not introduce information the context does not support.";

pub const QUERY_REFINEMENT_PROMPT: &str = "\
You are an expert at optimizing queries for knowledge retrieval.

Analyze the user's query and optimize it for document search and retrieval:
1. Identify key concepts and their relationships
2. Focus on important technical terms and entities
3. Include potential synonyms or related terms when relevant
4. Resolve references like \"it\" or \"this\" from the conversation context
5. Remove unnecessary filler words while preserving the semantic meaning

Return ONLY the optimized query without explanation or commentary.";

pub const DOCUMENT_EVALUATION_PROMPT: &str = "\
You are an expert document evaluator. Determine whether the retrieved documents
DIRECTLY answer the user's query AND provide a useful analysis if they do.

User Query: {query}

Retrieved Documents:

```markdown
{context}
```

EVALUATION CRITERIA:
1. DIRECT ANSWER: Do the documents directly address the specific question?
2. COMPLETE INFORMATION: Is there enough information for a complete answer?
3. SPECIFIC MATCH: Do the documents mention the exact entities or concepts asked about?

Your response must follow this precise format:
RELEVANT: [YES or NO]
EXPLANATION: [Explain why the documents are relevant or not relevant]
ANALYSIS: [If RELEVANT is YES, provide a detailed analysis of the key information \
that addresses the query. If RELEVANT is NO, write \"No relevant information found.\"]";

pub const CHUNK_SIZE_PROMPT: &str = "\
Analyze the following document and recommend an optimal chunk size for splitting
it into manageable pieces. Consider document length and complexity, natural
section breaks, context preservation and typical context window limitations.

Document preview (first 500 chars):
\"{document_preview}...\"

Document metadata:
{metadata}

Recommend a chunk size that balances processing efficiency, context preservation
and summary quality.";

pub const CHUNK_SUMMARY_PROMPT: &str = "\
You are a precise document summarizer. Create a clear, concise summary of the
following text chunk. Capture the main points and supporting details, preserve
key facts, figures and relationships, and maintain the original meaning.
Be concise but comprehensive.

Text chunk to summarize:
{chunk}";

pub const CONVERSATION_SUMMARY_PROMPT: &str =
    "Create a summary of the conversation above:";

pub const CONVERSATION_SUMMARY_EXTEND_PROMPT: &str = "\
This is summary of the conversation to date: {summary}

Extend the summary by taking into account the new messages above:";
