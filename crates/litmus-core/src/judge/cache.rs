use super::JudgeService;

/// Cache key over everything that can change a judge reply.
pub(crate) fn cache_key(svc: &JudgeService, system: &str, prompt: &str) -> String {
    let raw = format!(
        "{}:{}:{}:{}:{}:{}:{}",
        svc.config.provider,
        svc.client.model_id(),
        svc.config.temperature,
        svc.config.max_tokens,
        svc.config.system_prompt_version,
        system,
        prompt
    );
    format!("{:x}", md5::compute(raw))
}
