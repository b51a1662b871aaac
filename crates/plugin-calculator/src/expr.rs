//! Small arithmetic evaluator for `/calc`.
//!
//! Grammar, lowest precedence first:
//!
//! ```text
//! sum     = product (("+" | "-") product)*
//! product = power (("*" | "/") power)*
//! power   = unary ("^" power)?
//! unary   = "-" unary | atom
//! atom    = number | func "(" sum ")" | "(" sum ")"
//! ```
//!
//! Trigonometric functions take degrees.

/// Evaluates `input`, returning `None` for malformed input or a non-finite
/// result.
#[must_use]
pub fn evaluate(input: &str) -> Option<f64> {
    let mut parser = Parser {
        chars: input.chars().filter(|c| !c.is_whitespace()).collect(),
        pos: 0,
    };
    let value = parser.sum()?;
    (parser.pos == parser.chars.len() && value.is_finite()).then_some(value)
}

struct Parser {
    chars: Vec<char>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn eat(&mut self, c: char) -> bool {
        if self.peek() == Some(c) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn sum(&mut self) -> Option<f64> {
        let mut acc = self.product()?;
        loop {
            if self.eat('+') {
                acc += self.product()?;
            } else if self.eat('-') {
                acc -= self.product()?;
            } else {
                return Some(acc);
            }
        }
    }

    fn product(&mut self) -> Option<f64> {
        let mut acc = self.power()?;
        loop {
            if self.eat('*') {
                acc *= self.power()?;
            } else if self.eat('/') {
                let rhs = self.power()?;
                if rhs == 0.0 {
                    return None;
                }
                acc /= rhs;
            } else {
                return Some(acc);
            }
        }
    }

    fn power(&mut self) -> Option<f64> {
        let base = self.unary()?;
        if self.eat('^') {
            let exp = self.power()?;
            return Some(base.powf(exp));
        }
        Some(base)
    }

    fn unary(&mut self) -> Option<f64> {
        if self.eat('-') {
            return self.unary().map(|v| -v);
        }
        self.atom()
    }

    fn atom(&mut self) -> Option<f64> {
        if self.eat('(') {
            let v = self.sum()?;
            return self.eat(')').then_some(v);
        }
        match self.peek()? {
            c if c.is_ascii_digit() || c == '.' => self.number(),
            c if c.is_ascii_alphabetic() => self.function(),
            _ => None,
        }
    }

    fn number(&mut self) -> Option<f64> {
        let start = self.pos;
        while self
            .peek()
            .is_some_and(|c| c.is_ascii_digit() || c == '.')
        {
            self.pos += 1;
        }
        self.chars[start..self.pos]
            .iter()
            .collect::<String>()
            .parse()
            .ok()
    }

    fn function(&mut self) -> Option<f64> {
        let start = self.pos;
        while self.peek().is_some_and(|c| c.is_ascii_alphabetic()) {
            self.pos += 1;
        }
        let name: String = self.chars[start..self.pos]
            .iter()
            .collect::<String>()
            .to_lowercase();
        if !self.eat('(') {
            return None;
        }
        let arg = self.sum()?;
        if !self.eat(')') {
            return None;
        }
        match name.as_str() {
            "sqrt" if arg >= 0.0 => Some(arg.sqrt()),
            "sin" => Some(arg.to_radians().sin()),
            "cos" => Some(arg.to_radians().cos()),
            "tan" => Some(arg.to_radians().tan()),
            "abs" => Some(arg.abs()),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::evaluate;

    fn close(expr: &str, expected: f64) {
        let got = evaluate(expr).unwrap_or_else(|| panic!("{expr} did not evaluate"));
        assert!((got - expected).abs() < 1e-9, "{expr} = {got}, expected {expected}");
    }

    #[test]
    fn precedence_and_grouping() {
        close("2 + 2", 4.0);
        close("2 + 3 * 4", 14.0);
        close("(2 + 3) * 4", 20.0);
        close("2^3^2", 512.0);
        close("-3 + 5", 2.0);
        close("10 / 4", 2.5);
    }

    #[test]
    fn functions_use_degrees() {
        close("sqrt(16)", 4.0);
        close("sin(90)", 1.0);
        close("cos(0)", 1.0);
        close("42", 42.0);
    }

    #[test]
    fn malformed_input_is_rejected() {
        assert!(evaluate("").is_none());
        assert!(evaluate("2 +").is_none());
        assert!(evaluate("1 / 0").is_none());
        assert!(evaluate("sqrt(-1)").is_none());
        assert!(evaluate("rm -rf").is_none());
        assert!(evaluate("(1 + 2").is_none());
    }
}
