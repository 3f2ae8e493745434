use roomcap_core::Theory;

/// Prompt asking for an opinion on the room described by `caption`.
pub fn analysis_prompt(caption: &str, theory: Theory) -> String {
    match theory {
        Theory::SevenElements => format!(
            "You are a professional interior designer, Write a property or room analytical \
opinion using \"7 elements of interior design\" theory in bullet point for each element\n\n\
description: {caption}\n\n\
opinion listing:"
        ),
        Theory::FengShui => format!(
            "You are a chinese fortune teller, Write a property or room analytical opinion \
using \"Feng Shui\" or \"Chinese geomancy\" theory in detailed\n\n\
description: {caption}\n\n\
opinion listing:"
        ),
    }
}

/// Prompt asking for improvements, grounded in the caption and the opinion
/// already produced for it.
pub fn suggestion_prompt(caption: &str, analysis: &str, theory: Theory) -> String {
    match theory {
        Theory::SevenElements => format!(
            "You are a professional interior designer looking at a room with the follow \
description: {caption}\n\n\
, and using \"7 elements of interior design\" theory. You have given the following opinion: \
{analysis}\n\n\
By using the \"7 elements of interior design\" theory, Write room improvement suggestions \
based on the information above in a specific detailed, bullet-point format, with long \
reasoning explanation\n\n\
suggestion:"
        ),
        Theory::FengShui => format!(
            "You are a chinese fortune teller looking at a room with the follow description: \
{caption}\n\n\
, and using \"Feng Shui\" or \"Chinese geomancy\" theory and You have given the following \
opinion: {analysis}\n\n\
Write room improvement suggestions based on the information above in a specific detailed, \
bullet-point format, with long reasoning explanation\n\n\
suggestion:"
        ),
    }
}
