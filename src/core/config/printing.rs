use crate::core::config::data::{path_display, Config};

impl Config {
    pub fn print_all(&self) {
        println!("Current configuration:");
        match &self.default_provider {
            Some(provider) => println!("  default-provider: {provider}"),
            None => println!(
                "  default-provider: (unset, using {})",
                self.primary_provider()
            ),
        }
        match &self.system_prompt {
            Some(prompt) => println!("  system-prompt: {prompt}"),
            None => println!("  system-prompt: (default)"),
        }
        let sessions = match (self.sessions.enabled, self.sessions.autosave) {
            (false, _) => "off",
            (true, false) => "on",
            (true, true) => "on (autosave)",
        };
        println!("  sessions: {sessions}");
        if let Some(dir) = &self.sessions.directory {
            println!("  sessions-directory: {}", path_display(dir));
        }
        println!("  catalog-timeout: {}s", self.catalog_timeout().as_secs());
        if self.default_models.is_empty() {
            println!("  default-models: (none set)");
        } else {
            println!("  default-models:");
            let mut models: Vec<_> = self.default_models.iter().collect();
            models.sort_by_key(|(k, _)| *k);
            for (provider, model) in models {
                println!("    {provider}: {model}");
            }
        }
        if !self.custom_providers.is_empty() {
            println!("  custom-providers:");
            for provider in &self.custom_providers {
                println!("    {} ({})", provider.id, provider.base_urls.join(", "));
            }
        }
        if !self.model_rules.is_empty() {
            println!("  model-rules:");
            for rule in &self.model_rules {
                println!("    {} -> {}", rule.pattern, rule.mode);
            }
        }
    }
}
